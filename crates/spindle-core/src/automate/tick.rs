//! automateScheduleTick - 時間ベース trigger の見張り（watcher）
//!
//! 1 回の run で「今この時刻に一致する」active な trigger 全部に
//! automateTriggerRun を push し、次の tick 境界に later で戻る。
//! 同じ trigger の run がまだ残っていれば collision で弾かれるだけ。
//! 判定は時間単位。同じ時間枠ですでに呼ばれた trigger は飛ばす。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::runner::{RunSettings, push_trigger_run};
use super::schedule::ScheduleTemplate;
use crate::domain::{PushOutcome, SpindleError, TaskOutcome, TaskType};
use crate::ports::{AutomateStore, TaskStore};
use crate::typed::{Handler, Params, Process, Task};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTick {}

impl Params for ScheduleTick {}

impl Task for ScheduleTick {
    const TYPE: TaskType = TaskType::AutomateScheduleTick;
}

impl ScheduleTick {
    /// Only one tick watcher may be in flight.
    pub fn collision_sign() -> String {
        TaskType::AutomateScheduleTick.to_string()
    }
}

/// `at` を含む interval の次の境界（epoch 基準）
pub fn next_boundary(at: DateTime<Utc>, interval: chrono::Duration) -> DateTime<Utc> {
    let step = interval.num_seconds().max(1);
    let floor = at.timestamp().div_euclid(step) * step;
    DateTime::from_timestamp(floor + step, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct ScheduleTickHandler {
    automate: Arc<dyn AutomateStore>,
    tasks: Arc<dyn TaskStore>,
    settings: RunSettings,
    interval: chrono::Duration,
}

impl ScheduleTickHandler {
    pub fn new(
        automate: Arc<dyn AutomateStore>,
        tasks: Arc<dyn TaskStore>,
        settings: RunSettings,
        interval: chrono::Duration,
    ) -> Self {
        Self {
            automate,
            tasks,
            settings,
            interval,
        }
    }
}

#[async_trait]
impl Handler<ScheduleTick> for ScheduleTickHandler {
    async fn handle(&self, process: Process<ScheduleTick>) -> Result<TaskOutcome, SpindleError> {
        let now = process.now();
        let mut queued = 0usize;

        for trigger in self.automate.list_triggers().await? {
            if !trigger.active {
                continue;
            }
            let Some(template) = ScheduleTemplate::for_trigger(&trigger.kind) else {
                continue;
            };
            let schedule = match template.compile() {
                Ok(schedule) => schedule,
                Err(err) => {
                    tracing::warn!(trigger_id = %trigger.id, error = %err, "invalid trigger schedule, skipped");
                    continue;
                }
            };
            if !schedule.matches(now) {
                continue;
            }
            if trigger
                .last_call_at
                .is_some_and(|last| schedule.same_hour(last, now))
            {
                tracing::debug!(trigger_id = %trigger.id, "already called this hour");
                continue;
            }
            match push_trigger_run(self.tasks.as_ref(), trigger.id, &self.settings).await? {
                PushOutcome::Queued(task) => {
                    queued += 1;
                    tracing::debug!(trigger_id = %trigger.id, task_id = %task.id, "trigger run queued");
                }
                PushOutcome::Collided { existing, .. } => {
                    tracing::debug!(trigger_id = %trigger.id, %existing, "trigger run already pending");
                }
            }
        }

        let next = next_boundary(now, self.interval);
        tracing::info!(queued, next = %next, "schedule tick");
        Ok(process.info(format!("queued {queued}")).later(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Conclusion, PushOptions, TaskId, TaskRecord, TaskReport, Trigger, TriggerKind, WalletId,
    };
    use crate::impls::InMemoryAutomateStore;
    use crate::ports::FixedClock;
    use crate::queue::InMemoryTaskStore;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // 2024-04-01 is a Monday
        Utc.with_ymd_and_hms(2024, 4, 1, h, m, 0).unwrap()
    }

    #[rstest]
    #[case(at(10, 0), at(11, 0))]
    #[case(at(10, 59), at(11, 0))]
    #[case(at(23, 30), Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap())]
    fn next_boundary_is_the_following_hour(#[case] now: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
        assert_eq!(next_boundary(now, chrono::Duration::hours(1)), expected);
    }

    fn tick_process() -> Process<ScheduleTick> {
        tick_process_at(at(10, 5))
    }

    fn tick_process_at(now: DateTime<Utc>) -> Process<ScheduleTick> {
        let options = PushOptions::default().watcher();
        let record = TaskRecord::new(
            TaskId::generate(),
            TaskType::AutomateScheduleTick.as_str(),
            serde_json::json!({}),
            options,
            at(10, 0),
        );
        Process::new(record, ScheduleTick {}, now)
    }

    async fn trigger(store: &InMemoryAutomateStore, kind: TriggerKind, active: bool) -> Trigger {
        let mut trigger = Trigger::new(WalletId::generate(), "t", kind, at(0, 0));
        trigger.active = active;
        store.save_trigger(&trigger).await.unwrap();
        trigger
    }

    #[tokio::test]
    async fn tick_queues_matching_triggers_and_rearms() {
        let automate = Arc::new(InMemoryAutomateStore::default());
        let tasks = Arc::new(InMemoryTaskStore::new(Arc::new(FixedClock::new(at(10, 5)))));

        let hourly = trigger(&automate, TriggerKind::EveryHour, true).await;
        let ten = trigger(&automate, TriggerKind::EveryDay { hour: 10, timezone: None }, true).await;
        // Monday 10:05 UTC = Monday 19:05 Tokyo
        let tokyo = trigger(
            &automate,
            TriggerKind::EveryWeek { week_day: 1, hour: 19, timezone: Some("Asia/Tokyo".into()) },
            true,
        )
        .await;
        trigger(&automate, TriggerKind::EveryDay { hour: 11, timezone: None }, true).await;
        trigger(&automate, TriggerKind::EveryHour, false).await;
        trigger(
            &automate,
            TriggerKind::ContractEvent {
                network: "1".into(),
                address: "0xabc".into(),
                event: "Transfer".into(),
                subscription: None,
            },
            true,
        )
        .await;
        trigger(&automate, TriggerKind::EveryDay { hour: 10, timezone: Some("Mars/Base".into()) }, true).await;

        let handler = ScheduleTickHandler::new(
            automate.clone(),
            tasks.clone(),
            RunSettings { topic: "default".into(), priority: 3 },
            chrono::Duration::hours(1),
        );

        let outcome = handler.handle(tick_process()).await.unwrap();
        assert_eq!(outcome.conclusion(), &Conclusion::Later { at: at(11, 0) });

        let counts = tasks.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 3);

        let mut queued = Vec::new();
        while let Some(task) = tasks.claim_due(&["default".to_string()], at(10, 5)).await.unwrap() {
            assert_eq!(task.priority, 3);
            queued.push(task.params["id"].as_str().unwrap().to_string());
        }
        let mut expected: Vec<String> = [hourly.id, ten.id, tokyo.id]
            .iter()
            .map(|id| id.as_ulid().to_string())
            .collect();
        queued.sort();
        expected.sort();
        assert_eq!(queued, expected);
    }

    #[tokio::test]
    async fn pending_run_is_not_duplicated() {
        let automate = Arc::new(InMemoryAutomateStore::default());
        let tasks = Arc::new(InMemoryTaskStore::new(Arc::new(FixedClock::new(at(10, 5)))));
        trigger(&automate, TriggerKind::EveryHour, true).await;

        let handler = ScheduleTickHandler::new(
            automate,
            tasks.clone(),
            RunSettings { topic: "default".into(), priority: 0 },
            chrono::Duration::hours(1),
        );
        for _ in 0..2 {
            handler.handle(tick_process()).await.unwrap();
        }

        let counts = tasks.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.collision, 1);
    }

    #[tokio::test]
    async fn trigger_called_this_hour_is_not_queued_again() {
        let automate = Arc::new(InMemoryAutomateStore::default());
        let clock = Arc::new(FixedClock::new(at(10, 0)));
        let tasks = Arc::new(InMemoryTaskStore::new(clock.clone()));
        let mut hourly = trigger(&automate, TriggerKind::EveryHour, true).await;

        let handler = ScheduleTickHandler::new(
            automate.clone(),
            tasks.clone(),
            RunSettings { topic: "default".into(), priority: 0 },
            chrono::Duration::minutes(15),
        );
        let topics = vec!["default".to_string()];

        let mut runs = 0;
        for minute in [0, 15, 30, 45] {
            let now = at(10, minute);
            let outcome = handler.handle(tick_process_at(now)).await.unwrap();
            assert_eq!(
                outcome.conclusion(),
                &Conclusion::Later { at: now + chrono::Duration::minutes(15) }
            );
            // the run completes before the next tick, as the runner would leave it
            while let Some(task) = tasks.claim_due(&topics, now).await.unwrap() {
                runs += 1;
                tasks.complete(TaskReport::new(task.id, now)).await.unwrap();
                hourly.last_call_at = Some(now);
                automate.save_trigger(&hourly).await.unwrap();
            }
        }
        assert_eq!(runs, 1);

        handler.handle(tick_process_at(at(11, 0))).await.unwrap();
        assert_eq!(tasks.counts_by_status().await.unwrap().pending, 1);
    }
}
