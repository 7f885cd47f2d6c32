//! spindle-core
//!
//! Durable at-least-once task queue and the automation rule engine built on it.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, outcome, decision, errors, automate）
//! - **ports**: 抽象化レイヤー（TaskStore, AutomateStore, Clock, chain / notifier ports）
//! - **typed**: 型付き Task API（Params, Task, Handler, Process, TypedRegistry）
//! - **queue**: TaskStore の実装（InMemory / SQLite）と retry policy
//! - **app**: AppBuilder, Dispatcher / WorkerGroup, ReaperLoop
//! - **automate**: trigger / condition / action のルールエンジン
//! - **impls**: その他の port 実装（InMemoryAutomateStore）
//! - **config**: TOML 設定

pub mod app;
pub mod automate;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod typed;

#[cfg(test)]
mod test_support;
