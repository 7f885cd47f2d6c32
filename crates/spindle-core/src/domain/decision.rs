//! Decision model: what the store should do with a concluded task.
//!
//! The Decider is the only place where a handler's outcome is turned into a
//! status transition. It is pure: same task + outcome + clock gives the same
//! decision.

use chrono::{DateTime, Utc};

use super::outcome::{Conclusion, TaskOutcome};
use super::task::TaskRecord;
use crate::queue::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Mark Done and release the collision sign.
    Complete,

    /// Back to Pending, not before `at`.
    Reschedule { at: DateTime<Utc>, reason: String },

    /// Terminal Error.
    MarkError { reason: String },
}

pub trait Decider: Send + Sync {
    fn decide(&self, task: &TaskRecord, outcome: &TaskOutcome, now: DateTime<Utc>) -> Decision;
}

/// Attempt-bounded retry with exponential backoff.
///
/// - Done -> Complete
/// - Later(at) -> Reschedule(at)
/// - Permanent error -> MarkError
/// - Retryable error -> Reschedule(now + backoff) while attempt < max_attempts
/// - Watcher tasks are always rescheduled after a retryable error
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
    max_attempts: u32,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy, max_attempts: u32) -> Self {
        Self {
            retry_policy,
            max_attempts,
        }
    }
}

impl Default for DefaultDecider {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), 5)
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, task: &TaskRecord, outcome: &TaskOutcome, now: DateTime<Utc>) -> Decision {
        match outcome.conclusion() {
            Conclusion::Done => Decision::Complete,
            Conclusion::Later { at } => Decision::Reschedule {
                at: *at,
                reason: "later".to_string(),
            },
            Conclusion::Error { message, kind } if !kind.is_retryable() => Decision::MarkError {
                reason: message.clone(),
            },
            Conclusion::Error { message, .. } => {
                if !task.watcher && task.attempt >= self.max_attempts {
                    return Decision::MarkError {
                        reason: format!(
                            "{message} (max attempts reached: {}/{})",
                            task.attempt, self.max_attempts
                        ),
                    };
                }
                let delay = self.retry_policy.next_delay(task.attempt);
                let at = self.retry_policy.next_run_at(task.attempt, now);
                Decision::Reschedule {
                    at,
                    reason: format!("retry after {delay:?}: {message}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, PushOptions, TaskId};
    use chrono::TimeZone;
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn task(attempt: u32, watcher: bool) -> TaskRecord {
        let mut options = PushOptions::default();
        options.watcher = watcher;
        let mut task = TaskRecord::new(TaskId::generate(), "h", serde_json::Value::Null, options, now());
        task.attempt = attempt;
        task
    }

    fn error(kind: ErrorKind) -> TaskOutcome {
        TaskOutcome::new(
            Conclusion::Error {
                message: "rpc timeout".into(),
                kind,
            },
            None,
            vec![],
        )
    }

    fn decider() -> DefaultDecider {
        DefaultDecider::new(
            RetryPolicy {
                base_delay: Duration::from_secs(2),
                multiplier: 2.0,
                max_delay: Duration::from_secs(60),
            },
            3,
        )
    }

    #[test]
    fn done_completes() {
        let outcome = TaskOutcome::new(Conclusion::Done, None, vec![]);
        assert_eq!(decider().decide(&task(1, false), &outcome, now()), Decision::Complete);
    }

    #[test]
    fn later_is_not_a_failure() {
        let at = now() + chrono::Duration::minutes(5);
        let outcome = TaskOutcome::new(Conclusion::Later { at }, None, vec![]);
        // even past max attempts, later keeps the task alive
        let decision = decider().decide(&task(10, false), &outcome, now());
        assert!(matches!(decision, Decision::Reschedule { at: got, .. } if got == at));
    }

    #[test]
    fn permanent_error_is_fatal() {
        let decision = decider().decide(&task(1, false), &error(ErrorKind::Permanent), now());
        assert_eq!(
            decision,
            Decision::MarkError {
                reason: "rpc timeout".into()
            }
        );
    }

    #[test]
    fn transient_error_backs_off() {
        let decision = decider().decide(&task(2, false), &error(ErrorKind::Transient), now());
        match decision {
            Decision::Reschedule { at, .. } => assert_eq!(at, now() + chrono::Duration::seconds(4)),
            other => panic!("expected reschedule, got {other:?}"),
        }
    }

    #[test]
    fn transient_error_gives_up_after_max_attempts() {
        let decision = decider().decide(&task(3, false), &error(ErrorKind::Infrastructure), now());
        assert!(matches!(decision, Decision::MarkError { reason } if reason.contains("3/3")));
    }

    #[test]
    fn watcher_never_dies_from_transient_errors() {
        let decision = decider().decide(&task(30, true), &error(ErrorKind::Transient), now());
        match decision {
            Decision::Reschedule { at, .. } => assert_eq!(at, now() + chrono::Duration::seconds(60)),
            other => panic!("expected reschedule, got {other:?}"),
        }
    }
}
