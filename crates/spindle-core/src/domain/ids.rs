//! Domain identifiers (strongly-typed IDs).
//!
//! すべての ID は ULID ベースです。
//! `Id<T>` の `T` は PhantomData のマーカー型で、TaskId と TriggerId のような
//! 異なる ID をコンパイル時に区別します。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順序でソートできる（タスクの作成順に使う）
//! - **分散生成可能**: 複数ワーカーが調整なしで生成できる

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "trigger-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// Serialized as the bare ULID string; the prefix only appears in `Display`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id stamped with the current system time.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when an id string is neither `<prefix><ulid>` nor a bare ULID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed id: {0}")]
pub struct ParseIdError(String);

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// Accepts both the prefixed display form and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError(s.to_string()))
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {}

        impl IdMarker for $name {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(
    /// Queued unit of work.
    Task => "task-"
);
id_marker!(
    /// Automation rule.
    Trigger => "trigger-"
);
id_marker!(Condition => "condition-");
id_marker!(Action => "action-");
id_marker!(
    /// One row of trigger call history.
    CallHistory => "call-"
);
id_marker!(
    /// Owner of triggers. Wallets themselves live outside this crate.
    Wallet => "wallet-"
);

// ========================================
// Type Alias（使いやすさのため）
// ========================================

pub type TaskId = Id<Task>;
pub type TriggerId = Id<Trigger>;
pub type ConditionId = Id<Condition>;
pub type ActionId = Id<Action>;
pub type CallHistoryId = Id<CallHistory>;
pub type WalletId = Id<Wallet>;
