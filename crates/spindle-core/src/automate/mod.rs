//! Automate - trigger / condition / action のルールエンジン
//!
//! # 構成
//! - `predicate` / `schedule`: cron 風のフィールド式
//! - `evaluator` / `executor`: condition / action の registry
//! - `conditions` / `actions`: 組み込みの condition / action
//! - `runner`: 1 trigger の評価と実行（automateTriggerRun）
//! - `tick` / `event`: trigger run を push する側（watcher と webhook）
//! - `transaction`: ethereumAutomateRun の後続タスク
//! - `service`: CRUD と event 購読の管理

pub mod actions;
pub mod conditions;
pub mod evaluator;
pub mod event;
pub mod executor;
pub mod predicate;
pub mod runner;
pub mod schedule;
pub mod service;
pub mod tick;
pub mod transaction;

pub use self::actions::{EthereumAutomateRun, Notification};
pub use self::conditions::{Comparison, ContractMetric, EthereumBalance, EthereumGasPrice, ScheduleCondition};
pub use self::evaluator::{ConditionHandler, DynCondition, Evaluator};
pub use self::event::{ContractEvent, ContractEventHandler};
pub use self::executor::{ActionHandler, DynAction, Executor};
pub use self::predicate::{Predicate, PredicateError};
pub use self::runner::{RunSettings, TriggerRun, TriggerRunHandler, TriggerRunner, push_trigger_run};
pub use self::schedule::{Schedule, ScheduleTemplate};
pub use self::service::{AutomateError, AutomateService, TriggerUpdate};
pub use self::tick::{ScheduleTick, ScheduleTickHandler};
pub use self::transaction::{TransactionRun, TransactionRunHandler};
