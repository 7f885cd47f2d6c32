//! TaskStore port - タスクの正本（source of truth）
//!
//! ワーカー間の協調はすべてこの port のアトミックな状態遷移で行う。
//! 中央のインメモリスケジューラは存在しない。
//!
//! # 実装
//! - `InMemoryTaskStore`: 1 操作 = 1 クリティカルセクション
//! - `SqliteTaskStore`: 1 操作 = 1 条件付き UPDATE

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    PushOptions, PushOutcome, StoreError, TaskCounts, TaskId, TaskRecord, TaskReport,
};

/// TaskStore は状態遷移の権威
///
/// # 不変条件
/// - 同じ `collision_sign` を持つ Pending/Process のタスクは高々 1 つ
/// - `claim_due` で Process になるのは 1 ワーカーだけ
/// - `complete` / `fail` / `reschedule` は Process のタスクにだけ効く
///   （それ以外は `StoreError::NotInProcess`）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 新しい Pending タスクを作る。collision sign が競合した場合は
    /// Collision 行を残して `PushOutcome::Collided` を返す（エラーではない）。
    async fn push(
        &self,
        handler: &str,
        params: serde_json::Value,
        options: PushOptions,
    ) -> Result<PushOutcome, StoreError>;

    /// 期限の来た Pending タスクを 1 つ Process にする（attempt += 1）。
    ///
    /// 順序: priority 降順 → start_at 昇順 → id 昇順
    async fn claim_due(
        &self,
        topics: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError>;

    /// Process -> Done
    async fn complete(&self, report: TaskReport) -> Result<TaskRecord, StoreError>;

    /// Process -> Error
    async fn fail(&self, report: TaskReport, error: String) -> Result<TaskRecord, StoreError>;

    /// Process -> Pending (start_at = next_start_at)
    async fn reschedule(
        &self,
        report: TaskReport,
        next_start_at: DateTime<Utc>,
    ) -> Result<TaskRecord, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    async fn counts_by_status(&self) -> Result<TaskCounts, StoreError>;

    /// `cutoff` 以降更新のない Process タスクを Pending に戻す。戻した件数を返す。
    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// `before` より前に更新された Done / Error / Collision 行を消す。消した件数を返す。
    /// Pending / Process には触れない。
    async fn purge_finished(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}
