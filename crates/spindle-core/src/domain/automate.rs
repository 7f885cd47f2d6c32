//! Automation records: triggers, their conditions and actions, and call history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ActionId, CallHistoryId, ConditionId, TriggerId, WalletId};

/// When a trigger fires.
///
/// Time-based kinds are matched by the schedule tick; `ContractEvent` is
/// matched against observed blockchain events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum TriggerKind {
    #[serde(rename_all = "camelCase")]
    EveryMonth {
        month_day: u32,
        hour: u32,
        #[serde(default)]
        timezone: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EveryWeek {
        /// 0 = Sunday.
        week_day: u32,
        hour: u32,
        #[serde(default)]
        timezone: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EveryDay {
        hour: u32,
        #[serde(default)]
        timezone: Option<String>,
    },
    EveryHour,
    #[serde(rename_all = "camelCase")]
    ContractEvent {
        network: String,
        address: String,
        event: String,
        /// Webhook subscription held while the trigger exists.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<String>,
    },
}

impl TriggerKind {
    pub fn is_time_based(&self) -> bool {
        !matches!(self, TriggerKind::ContractEvent { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TriggerKind::EveryMonth { .. } => "everyMonth",
            TriggerKind::EveryWeek { .. } => "everyWeek",
            TriggerKind::EveryDay { .. } => "everyDay",
            TriggerKind::EveryHour => "everyHour",
            TriggerKind::ContractEvent { .. } => "contractEvent",
        }
    }

    /// Same event source, ignoring the subscription handle.
    pub fn same_source(&self, other: &TriggerKind) -> bool {
        match (self, other) {
            (
                TriggerKind::ContractEvent {
                    network: n1,
                    address: a1,
                    event: e1,
                    ..
                },
                TriggerKind::ContractEvent {
                    network: n2,
                    address: a2,
                    event: e2,
                    ..
                },
            ) => n1 == n2 && a1.eq_ignore_ascii_case(a2) && e1 == e2,
            (a, b) => a == b,
        }
    }
}

/// A user-owned automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: TriggerId,
    pub wallet: WalletId,
    pub name: String,
    #[serde(flatten)]
    pub kind: TriggerKind,
    pub active: bool,
    pub last_call_at: Option<DateTime<Utc>>,
    /// Consecutive failed runs.
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(wallet: WalletId, name: impl Into<String>, kind: TriggerKind, now: DateTime<Utc>) -> Self {
        Self {
            id: TriggerId::generate(),
            wallet,
            name: name.into(),
            kind,
            active: true,
            last_call_at: None,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {}: {s}", stringify!($name)))
            }
        }
    };
}

string_enum!(
    /// Closed set of condition handlers.
    ConditionType {
        Schedule => "schedule",
        EthereumBalance => "ethereumBalance",
        EthereumGasPrice => "ethereumGasPrice",
        ContractMetric => "contractMetric",
    }
);

string_enum!(
    /// Closed set of action handlers.
    ActionType {
        Notification => "notification",
        EthereumAutomateRun => "ethereumAutomateRun",
    }
);

/// A predicate attached to a trigger. Evaluated in ascending `priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: ConditionId,
    pub trigger: TriggerId,
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub params: serde_json::Value,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        trigger: TriggerId,
        kind: ConditionType,
        params: serde_json::Value,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConditionId::generate(),
            trigger,
            kind,
            params,
            priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An effect attached to a trigger. Executed in ascending `priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: ActionId,
    pub trigger: TriggerId,
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub params: serde_json::Value,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    pub fn new(
        trigger: TriggerId,
        kind: ActionType,
        params: serde_json::Value,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActionId::generate(),
            trigger,
            kind,
            params,
            priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a single trigger run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Every condition held and every action succeeded.
    Fired,
    /// A condition evaluated to false.
    Skipped,
    /// A condition failed validation or threw.
    NotFired,
    /// An action threw.
    Failed,
}

impl CallOutcome {
    /// Runs that count against `Trigger::retries`.
    pub fn is_failure(self) -> bool {
        matches!(self, CallOutcome::NotFired | CallOutcome::Failed)
    }
}

/// Append-only audit row, one per recorded trigger run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHistory {
    pub id: CallHistoryId,
    pub trigger: TriggerId,
    pub outcome: CallOutcome,
    /// `None` means the run did not fail.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CallHistory {
    pub fn new(
        trigger: TriggerId,
        outcome: CallOutcome,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CallHistoryId::generate(),
            trigger,
            outcome,
            error,
            created_at: now,
        }
    }
}
