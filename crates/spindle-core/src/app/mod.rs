//! App - アプリケーション層
//!
//! ports を組み合わせて queue を回す。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: handler 登録と起動時検証
//! - **Dispatcher / WorkerGroup**: claim → handle → decide → apply のループ
//! - **ReaperLoop**: 止まった Process タスクの回収

pub mod builder;
pub mod reaper_loop;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::reaper_loop::ReaperLoop;
pub use self::worker_loop::{Dispatcher, DispatcherSettings, WorkerGroup};
