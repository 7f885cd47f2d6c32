//! TaskType - 登録可能な handler 名の閉じた集合
//!
//! The `handler` column of a task stores one of these names. Anything else is
//! reported by the registry as "handler not found".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    /// Evaluate one trigger: conditions, then actions.
    AutomateTriggerRun,
    /// Watcher that enqueues runs for time-based triggers due this hour.
    AutomateScheduleTick,
    /// Fan an observed contract event out to the triggers listening for it.
    AutomateContractEvent,
    /// Send an automation transaction and poll for its receipt.
    AutomateTransactionRun,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::AutomateTriggerRun,
        TaskType::AutomateScheduleTick,
        TaskType::AutomateContractEvent,
        TaskType::AutomateTransactionRun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::AutomateTriggerRun => "automateTriggerRun",
            TaskType::AutomateScheduleTick => "automateScheduleTick",
            TaskType::AutomateContractEvent => "automateContractEvent",
            TaskType::AutomateTransactionRun => "automateTransactionRun",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task type: {0}")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serde_representation() {
        for task_type in TaskType::ALL {
            let json = serde_json::to_value(task_type).unwrap();
            assert_eq!(json, task_type.as_str());
            assert_eq!(task_type.as_str().parse::<TaskType>().unwrap(), task_type);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "sendEmail".parse::<TaskType>().unwrap_err();
        assert_eq!(err, UnknownTaskType("sendEmail".into()));
    }
}
