//! WorkerLoop - タスク実行ループ
//!
//! # フロー（1 回分 = `Dispatcher::run_once`）
//! 1. TaskStore::claim_due() で Pending -> Process
//! 2. handler 名を registry で引く（無ければ Permanent エラー）
//! 3. 別 task + timeout で handler 実行 → TaskOutcome
//! 4. Decider 実行 → Decision
//! 5. complete / reschedule / fail で状態更新
//!
//! `WorkerGroup` はこれを n 本並べて回す。ワーカー間の協調は
//! TaskStore のアトミックな遷移だけで行う。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{
    Conclusion, Decider, Decision, SpindleError, StoreError, TaskOutcome, TaskRecord, TaskReport,
};
use crate::ports::{Clock, TaskStore};
use crate::typed::{DynHandler, TypedRegistry};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Topics this dispatcher consumes.
    pub topics: Vec<String>,
    pub handler_timeout: Duration,
    /// Idle sleep between empty claims.
    pub poll_interval: Duration,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    registry: Arc<TypedRegistry>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<TypedRegistry>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            registry,
            decider,
            clock,
            settings,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    /// 期限の来たタスクを 1 つ実行する。何も無ければ `None`。
    ///
    /// 返り値は outcome を適用した後のレコード。
    pub async fn run_once(&self) -> Result<Option<TaskRecord>, StoreError> {
        let now = self.clock.now();
        let Some(task) = self.store.claim_due(&self.settings.topics, now).await? else {
            return Ok(None);
        };
        tracing::debug!(task_id = %task.id, handler = %task.handler, attempt = task.attempt, "task claimed");

        let started = Instant::now();
        let outcome = match self.registry.resolve(&task.handler) {
            Ok(handler) => self.invoke(handler, task.clone(), now).await,
            Err(err) => {
                tracing::warn!(task_id = %task.id, handler = %task.handler, "handler not found");
                TaskOutcome::failed(&SpindleError::permanent(err.to_string()))
            }
        };
        let elapsed = started.elapsed();

        let finished_at = self.clock.now();
        let decision = self.decider.decide(&task, &outcome, finished_at);

        let (conclusion, params, info) = outcome.into_parts();
        let mut report = TaskReport::new(task.id, finished_at);
        report.params = params;
        report.info = info;
        report.execution_time = elapsed;
        report.rearm = matches!(conclusion, Conclusion::Later { .. });

        let record = match decision {
            Decision::Complete => self.store.complete(report).await?,
            Decision::Reschedule { at, reason } => {
                if !report.rearm {
                    report.info.push(reason);
                }
                self.store.reschedule(report, at).await?
            }
            Decision::MarkError { reason } => self.store.fail(report, reason).await?,
        };

        tracing::info!(
            task_id = %record.id,
            handler = %record.handler,
            conclusion = conclusion.name(),
            status = %record.status,
            attempt = record.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            "task outcome applied"
        );
        Ok(Some(record))
    }

    /// handler を別 task で動かす。panic と timeout は Transient 扱い。
    async fn invoke(
        &self,
        handler: Arc<dyn DynHandler>,
        task: TaskRecord,
        now: chrono::DateTime<chrono::Utc>,
    ) -> TaskOutcome {
        let id = task.id;
        let mut join = tokio::spawn(async move { handler.handle_dyn(task, now).await });
        match tokio::time::timeout(self.settings.handler_timeout, &mut join).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::error!(task_id = %id, error = %err, "handler panicked");
                TaskOutcome::failed(&SpindleError::transient(format!("handler panicked: {err}")))
            }
            Err(_) => {
                join.abort();
                tracing::warn!(task_id = %id, timeout = ?self.settings.handler_timeout, "handler timed out");
                TaskOutcome::failed(&SpindleError::transient(format!(
                    "handler timed out after {:?}",
                    self.settings.handler_timeout
                )))
            }
        }
    }
}

/// Worker group handle.
/// - `request_shutdown` で全ワーカーが新しい claim をやめる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let dispatcher = Arc::clone(&dispatcher);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, dispatcher, &mut rx).await;
            }));
        }
        tracing::info!(workers = n, "worker group started");

        Self { shutdown_tx, joins }
    }

    /// 実行中の handler は止めない。新しい claim をやめるだけ。
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker exited abnormally");
            }
        }
        tracing::info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    dispatcher: Arc<Dispatcher>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match dispatcher.run_once().await {
            // 続けて次を取りに行く
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(err) => tracing::error!(worker_id, error = %err, "dispatch failed"),
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(dispatcher.poll_interval()) => {}
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}
