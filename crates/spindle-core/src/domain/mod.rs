//! Domain model (ids, tasks, outcomes, decisions, automation records).
//!
//! ここにあるのは値と純粋なロジックだけです。I/O は ports の向こう側。

pub mod automate;
pub mod decision;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod task;
pub mod task_type;

pub use automate::{
    Action, ActionType, CallHistory, CallOutcome, Condition, ConditionType, Trigger, TriggerKind,
};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ErrorKind, SpindleError, StoreError, ValidationError};
pub use ids::{ActionId, CallHistoryId, ConditionId, ParseIdError, TaskId, TriggerId, WalletId};
pub use outcome::{Conclusion, TaskOutcome};
pub use task::{
    DEFAULT_TOPIC, PushOptions, PushOutcome, TaskCounts, TaskRecord, TaskReport, TaskStatus,
};
pub use task_type::{TaskType, UnknownTaskType};
