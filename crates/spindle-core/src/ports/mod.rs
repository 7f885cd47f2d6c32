//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。core のロジックはここにある trait だけに
//! 依存し、永続化や chain RPC や通知チャネルの実装詳細は知らない。

pub mod automate_store;
pub mod chain;
pub mod clock;
pub mod id_generator;
pub mod metrics;
pub mod notifier;
pub mod task_store;

pub use self::automate_store::AutomateStore;
pub use self::chain::{ChainReader, EventSubscriber, TransactionSender};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator, next_id};
pub use self::metrics::MetricReader;
pub use self::notifier::Notifier;
pub use self::task_store::TaskStore;
