//! Trigger Runner - 1 つの trigger を評価して実行する
//!
//! # フロー
//! 1. trigger を読む（無い / inactive なら何もしない、history も書かない）
//! 2. conditions を priority 昇順に評価。最初の false で Skipped、エラーで NotFired
//! 3. すべて真なら actions を priority 昇順に実行。エラーで Failed
//! 4. call history を 1 行書き、lastCallAt / retries / active を更新

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::evaluator::Evaluator;
use super::executor::Executor;
use crate::domain::{
    CallHistory, CallOutcome, PushOptions, PushOutcome, SpindleError, StoreError, TaskOutcome,
    TaskType, Trigger, TriggerId,
};
use crate::ports::{AutomateStore, Clock, TaskStore};
use crate::typed::{Handler, Params, Process, Task};

pub struct TriggerRunner {
    store: Arc<dyn AutomateStore>,
    evaluator: Arc<Evaluator>,
    executor: Arc<Executor>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl TriggerRunner {
    pub fn new(
        store: Arc<dyn AutomateStore>,
        evaluator: Arc<Evaluator>,
        executor: Arc<Executor>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            evaluator,
            executor,
            clock,
            max_retries,
        }
    }

    /// Returns the recorded history row, or `None` when the trigger is
    /// missing or inactive.
    pub async fn run(&self, id: TriggerId) -> Result<Option<CallHistory>, StoreError> {
        let Some(mut trigger) = self.store.get_trigger(id).await? else {
            tracing::debug!(trigger_id = %id, "trigger not found, nothing to run");
            return Ok(None);
        };
        if !trigger.active {
            tracing::debug!(trigger_id = %id, "trigger inactive, nothing to run");
            return Ok(None);
        }

        let (outcome, error) = self.evaluate_and_execute(&trigger).await?;

        let now = self.clock.now();
        let entry = CallHistory::new(id, outcome, error, now);
        self.store.append_history(&entry).await?;

        self.bookkeep(&mut trigger, outcome, now);
        self.store.save_trigger(&trigger).await?;

        match outcome {
            CallOutcome::Fired => tracing::info!(trigger_id = %id, "trigger fired"),
            CallOutcome::Skipped => tracing::debug!(trigger_id = %id, "trigger skipped"),
            CallOutcome::NotFired | CallOutcome::Failed => tracing::warn!(
                trigger_id = %id,
                outcome = ?outcome,
                retries = trigger.retries,
                error = entry.error.as_deref().unwrap_or_default(),
                "trigger run failed"
            ),
        }
        Ok(Some(entry))
    }

    async fn evaluate_and_execute(
        &self,
        trigger: &Trigger,
    ) -> Result<(CallOutcome, Option<String>), StoreError> {
        for condition in self.store.conditions(trigger.id).await? {
            match self.evaluator.evaluate(&condition).await {
                Ok(true) => {}
                Ok(false) => return Ok((CallOutcome::Skipped, None)),
                Err(err) => {
                    return Ok((
                        CallOutcome::NotFired,
                        Some(format!("condition {} ({}): {err}", condition.kind, condition.id)),
                    ));
                }
            }
        }

        // 途中の action が失敗したら残りは実行しない
        for action in self.store.actions(trigger.id).await? {
            if let Err(err) = self.executor.execute(&action).await {
                return Ok((
                    CallOutcome::Failed,
                    Some(format!("action {} ({}): {err}", action.kind, action.id)),
                ));
            }
        }
        Ok((CallOutcome::Fired, None))
    }

    fn bookkeep(&self, trigger: &mut Trigger, outcome: CallOutcome, now: chrono::DateTime<chrono::Utc>) {
        trigger.last_call_at = Some(now);
        trigger.updated_at = now;
        if !outcome.is_failure() {
            trigger.retries = 0;
            return;
        }
        trigger.retries = trigger.retries.saturating_add(1);
        if trigger.retries >= self.max_retries {
            trigger.active = false;
            tracing::warn!(
                trigger_id = %trigger.id,
                retries = trigger.retries,
                "retries ceiling reached, trigger deactivated"
            );
        }
    }
}

// ----------------------------------------------------------------------------
// automateTriggerRun
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRun {
    pub id: TriggerId,
}

impl Params for TriggerRun {}

impl Task for TriggerRun {
    const TYPE: TaskType = TaskType::AutomateTriggerRun;
}

impl TriggerRun {
    /// At most one pending/running evaluation per trigger.
    pub fn collision_sign(&self) -> String {
        format!("{}:{}", TaskType::AutomateTriggerRun, self.id)
    }
}

/// Queue settings for trigger runs pushed by the tick / event handlers.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub topic: String,
    pub priority: i32,
}

/// automateTriggerRun を push する。Collision は「すでに待っている」なので成功扱い。
pub async fn push_trigger_run(
    tasks: &dyn TaskStore,
    id: TriggerId,
    settings: &RunSettings,
) -> Result<PushOutcome, StoreError> {
    let run = TriggerRun { id };
    let options = PushOptions::default()
        .with_topic(settings.topic.clone())
        .with_priority(settings.priority)
        .with_collision_sign(run.collision_sign());
    let raw = serde_json::to_value(&run)?;
    tasks.push(TriggerRun::TYPE.as_str(), raw, options).await
}

pub struct TriggerRunHandler {
    runner: Arc<TriggerRunner>,
}

impl TriggerRunHandler {
    pub fn new(runner: Arc<TriggerRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Handler<TriggerRun> for TriggerRunHandler {
    async fn handle(&self, process: Process<TriggerRun>) -> Result<TaskOutcome, SpindleError> {
        let id = process.params().id;
        let outcome = match self.runner.run(id).await? {
            Some(entry) => process.info(format!("{id}: {:?}", entry.outcome)).done(),
            None => process.info(format!("{id}: missing or inactive")).done(),
        };
        Ok(outcome)
    }
}
