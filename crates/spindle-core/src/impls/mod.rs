//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryAutomateStore**: trigger / condition / action / history の正本
//!
//! TaskStore の実装は `queue` モジュールにある（InMemory / SQLite）。

pub mod inmem_automate;

pub use self::inmem_automate::InMemoryAutomateStore;
