//! ReaperLoop - 止まった Process タスクの回収
//!
//! ワーカーが claim した後に落ちると、タスクは Process のまま残る。
//! `stale_after` より長く更新のない Process を Pending に戻す。
//! handler 側は at-least-once 前提なので、二重実行は許容される。
//!
//! `retention` があれば、同じ周期で古い Done / Error / Collision 行も消す。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::StoreError;
use crate::ports::{Clock, TaskStore};

pub struct ReaperLoop {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    interval: Duration,
    retention: Option<Duration>,
}

impl ReaperLoop {
    pub fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            stale_after,
            interval,
            retention: None,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    fn cutoff(&self, age: Duration) -> chrono::DateTime<chrono::Utc> {
        let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_sub_signed(age)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
    }

    pub async fn reap_once(&self) -> Result<usize, StoreError> {
        let cutoff = self.cutoff(self.stale_after);
        let reaped = self.store.reap_stale(cutoff).await?;
        if reaped > 0 {
            tracing::warn!(reaped, %cutoff, "stale tasks returned to pending");
        }
        Ok(reaped)
    }

    /// retention を過ぎた終了済みの行を消す。retention 未設定なら何もしない。
    pub async fn purge_once(&self) -> Result<usize, StoreError> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let before = self.cutoff(retention);
        let purged = self.store.purge_finished(before).await?;
        if purged > 0 {
            tracing::info!(purged, %before, "finished tasks purged");
        }
        Ok(purged)
    }

    /// shutdown が来るまで `interval` ごとに回収する
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            if let Err(err) = self.reap_once().await {
                tracing::error!(error = %err, "reap failed");
            }
            if let Err(err) = self.purge_once().await {
                tracing::error!(error = %err, "purge failed");
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::debug!("reaper stopped");
    }
}
