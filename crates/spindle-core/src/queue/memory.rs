//! In-memory task store.
//!
//! Every operation takes the state lock once and finishes inside it, so each
//! one is as atomic as a conditional update in a real database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    PushOptions, PushOutcome, StoreError, TaskCounts, TaskId, TaskRecord, TaskReport, TaskStatus,
};
use crate::ports::{Clock, IdGenerator, TaskStore, UlidGenerator, next_id};

/// In-memory store state.
#[derive(Default)]
struct InMemoryState {
    /// All task records (single source of truth).
    records: HashMap<TaskId, TaskRecord>,

    /// collision_sign -> in-flight holder.
    signs: HashMap<String, TaskId>,
}

impl InMemoryState {
    fn in_process_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, StoreError> {
        match self.records.get_mut(&id) {
            Some(record) if record.status == TaskStatus::Process => Ok(record),
            Some(_) => Err(StoreError::NotInProcess(id)),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Drop the sign index entry once the holder leaves Pending/Process.
    fn release_sign(&mut self, record: &TaskRecord) {
        if let Some(sign) = &record.collision_sign
            && self.signs.get(sign) == Some(&record.id)
        {
            self.signs.remove(sign);
        }
    }

    fn finish(
        &mut self,
        report: &TaskReport,
        apply: impl FnOnce(&mut TaskRecord),
    ) -> Result<TaskRecord, StoreError> {
        let record = self.in_process_mut(report.id)?;
        record.absorb(report);
        apply(record);
        let record = record.clone();
        if !record.status.is_in_flight() {
            self.release_sign(&record);
        }
        Ok(record)
    }
}

/// Mutex-guarded map of tasks. Lost on restart; used for tests and
/// single-process runs without `storage.path`.
pub struct InMemoryTaskStore {
    state: Mutex<InMemoryState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self {
            state: Mutex::new(InMemoryState::default()),
            clock,
            ids,
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn push(
        &self,
        handler: &str,
        params: serde_json::Value,
        options: PushOptions,
    ) -> Result<PushOutcome, StoreError> {
        let now = self.clock.now();
        let mut record = TaskRecord::new(next_id(self.ids.as_ref()), handler, params, options, now);

        let mut state = self.state.lock().await;
        if let Some(sign) = record.collision_sign.clone() {
            if let Some(&existing) = state.signs.get(&sign) {
                record.status = TaskStatus::Collision;
                record.push_info(&format!("collision with {existing}"));
                state.records.insert(record.id, record.clone());
                tracing::debug!(task_id = %record.id, %existing, sign = %sign, "push collided");
                return Ok(PushOutcome::Collided {
                    task: record,
                    existing,
                });
            }
            state.signs.insert(sign, record.id);
        }
        state.records.insert(record.id, record.clone());
        tracing::debug!(task_id = %record.id, handler = %record.handler, "task pushed");
        Ok(PushOutcome::Queued(record))
    }

    async fn claim_due(
        &self,
        topics: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state
            .records
            .values()
            .filter(|r| r.is_due(topics, now))
            .min_by_key(|r| r.dispatch_key())
            .map(|r| r.id)
        else {
            return Ok(None);
        };

        let record = state
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.start_attempt(now);
        Ok(Some(record.clone()))
    }

    async fn complete(&self, report: TaskReport) -> Result<TaskRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.finish(&report, TaskRecord::mark_done)
    }

    async fn fail(&self, report: TaskReport, error: String) -> Result<TaskRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.finish(&report, |r| r.mark_error(error))
    }

    async fn reschedule(
        &self,
        report: TaskReport,
        next_start_at: DateTime<Utc>,
    ) -> Result<TaskRecord, StoreError> {
        let rearm = report.rearm;
        let mut state = self.state.lock().await;
        state.finish(&report, |r| r.reschedule(next_start_at, rearm))
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&id).cloned())
    }

    async fn counts_by_status(&self) -> Result<TaskCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = TaskCounts::default();
        for record in state.records.values() {
            counts.add(record.status, 1);
        }
        Ok(counts)
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut reaped = 0;
        for record in state.records.values_mut() {
            if record.status == TaskStatus::Process && record.updated_at < cutoff {
                record.push_info("reaped: no outcome before stale cutoff");
                record.status = TaskStatus::Pending;
                record.updated_at = now;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn purge_finished(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let total = state.records.len();
        state
            .records
            .retain(|_, r| r.status.is_in_flight() || r.updated_at >= before);
        Ok(total - state.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn topics() -> Vec<String> {
        vec!["default".to_string()]
    }

    fn store() -> (Arc<FixedClock>, InMemoryTaskStore) {
        let clock = Arc::new(FixedClock::new(start()));
        let store = InMemoryTaskStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn second_push_with_same_sign_collides() {
        let (_, store) = store();
        let options = PushOptions::default().with_collision_sign("scan:1");

        let first = store.push("h", json!({}), options.clone()).await.unwrap();
        let second = store.push("h", json!({}), options.clone()).await.unwrap();

        assert!(first.is_queued());
        match &second {
            PushOutcome::Collided { task, existing } => {
                assert_eq!(*existing, first.task().id);
                assert_eq!(task.status, TaskStatus::Collision);
            }
            other => panic!("expected collision, got {other:?}"),
        }

        // the collided row is never claimable
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.task().id);
        assert!(store.claim_due(&topics(), start()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_is_released_after_completion() {
        let (_, store) = store();
        let options = PushOptions::default().with_collision_sign("scan:1");

        store.push("h", json!({}), options.clone()).await.unwrap();
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();

        // still in Process: sign is held
        let during = store.push("h", json!({}), options.clone()).await.unwrap();
        assert!(!during.is_queued());

        store
            .complete(TaskReport::new(claimed.id, start()))
            .await
            .unwrap();
        let after = store.push("h", json!({}), options).await.unwrap();
        assert!(after.is_queued());
    }

    #[tokio::test]
    async fn claims_by_priority_then_start() {
        let (_, store) = store();
        let earlier = start() - chrono::Duration::minutes(10);
        let low = store
            .push("h", json!(1), PushOptions::default().with_start_at(earlier))
            .await
            .unwrap();
        let high_late = store
            .push("h", json!(2), PushOptions::default().with_priority(10))
            .await
            .unwrap();
        let high_early = store
            .push(
                "h",
                json!(3),
                PushOptions::default().with_priority(10).with_start_at(earlier),
            )
            .await
            .unwrap();

        let mut order = Vec::new();
        while let Some(task) = store.claim_due(&topics(), start()).await.unwrap() {
            order.push(task.id);
        }
        assert_eq!(
            order,
            vec![high_early.task().id, high_late.task().id, low.task().id]
        );
    }

    #[tokio::test]
    async fn future_task_waits_for_start_at() {
        let (clock, store) = store();
        let hour_later = start() + chrono::Duration::hours(1);
        store
            .push("h", json!({}), PushOptions::default().with_start_at(hour_later))
            .await
            .unwrap();

        assert!(store.claim_due(&topics(), start()).await.unwrap().is_none());
        clock.advance(chrono::Duration::minutes(59));
        assert!(store.claim_due(&topics(), clock.now()).await.unwrap().is_none());
        clock.advance(chrono::Duration::minutes(1));
        assert!(store.claim_due(&topics(), clock.now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn other_topics_are_not_claimed() {
        let (_, store) = store();
        store
            .push("h", json!({}), PushOptions::default().with_topic("chain"))
            .await
            .unwrap();
        assert!(store.claim_due(&topics(), start()).await.unwrap().is_none());
        assert!(
            store
                .claim_due(&["chain".to_string()], start())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn push_claim_complete_leaves_nothing_in_flight() {
        let (_, store) = store();
        let pushed = store.push("h", json!({"a": 1}), PushOptions::default()).await.unwrap();
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();
        assert_eq!(claimed.attempt, 1);

        let mut report = TaskReport::new(claimed.id, start());
        report.info.push("ok".into());
        let done = store.complete(report).await.unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.info, "ok");

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending + counts.process, 0);
        assert_eq!(counts.done, 1);
        assert_eq!(
            store.get(pushed.task().id).await.unwrap().unwrap().status,
            TaskStatus::Done
        );
    }

    #[tokio::test]
    async fn outcome_on_finished_task_is_rejected() {
        let (_, store) = store();
        store.push("h", json!({}), PushOptions::default()).await.unwrap();
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();
        store
            .complete(TaskReport::new(claimed.id, start()))
            .await
            .unwrap();

        let err = store
            .fail(TaskReport::new(claimed.id, start()), "late".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotInProcess(id) if id == claimed.id));
    }

    #[tokio::test]
    async fn reschedule_replaces_params_and_start() {
        let (_, store) = store();
        store.push("h", json!({"block": 1}), PushOptions::default()).await.unwrap();
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();

        let next = start() + chrono::Duration::minutes(5);
        let mut report = TaskReport::new(claimed.id, start());
        report.params = Some(json!({"block": 100}));
        let task = store.reschedule(report, next).await.unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.start_at, next);
        assert_eq!(task.params, json!({"block": 100}));
        assert_eq!(task.attempt, 1);
    }

    #[tokio::test]
    async fn rearm_restarts_attempts() {
        let (_, store) = store();
        store.push("h", json!({}), PushOptions::default()).await.unwrap();
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();

        let mut report = TaskReport::new(claimed.id, start());
        report.rearm = true;
        let task = store.reschedule(report, start()).await.unwrap();
        assert_eq!(task.attempt, 0);

        let again = store.claim_due(&topics(), start()).await.unwrap().unwrap();
        assert_eq!(again.attempt, 1);
    }

    #[tokio::test]
    async fn stale_process_tasks_are_reaped() {
        let (clock, store) = store();
        store.push("h", json!({}), PushOptions::default()).await.unwrap();
        let claimed = store.claim_due(&topics(), start()).await.unwrap().unwrap();

        clock.advance(chrono::Duration::minutes(30));
        let reaped = store
            .reap_stale(clock.now() - chrono::Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(reaped, 1);

        let task = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt, 1);
    }

    #[tokio::test]
    async fn purge_drops_old_finished_rows_only() {
        let (clock, store) = store();
        let sign = PushOptions::default().with_collision_sign("tick");
        let holder = store.push("h", json!({}), sign.clone()).await.unwrap();
        for _ in 0..3 {
            store.push("h", json!({}), sign.clone()).await.unwrap();
        }
        store.push("h", json!({}), PushOptions::default().with_priority(-1)).await.unwrap();
        let done = store.claim_due(&topics(), start()).await.unwrap().unwrap();
        assert_eq!(done.id, holder.task().id);
        store.complete(TaskReport::new(done.id, start())).await.unwrap();

        clock.advance(chrono::Duration::hours(2));
        let recent = store.push("h", json!({}), sign.clone()).await.unwrap();
        store.push("h", json!({}), sign).await.unwrap();

        let purged = store
            .purge_finished(clock.now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(purged, 4);

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.done, 0);
        assert_eq!(counts.collision, 1);
        assert_eq!(counts.pending, 2);
        assert!(store.get(recent.task().id).await.unwrap().is_some());
        assert!(store.get(holder.task().id).await.unwrap().is_none());
    }
}
