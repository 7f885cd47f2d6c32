//! AutomateStore port - trigger / condition / action / call history の永続化
//!
//! スキーマやマイグレーションはこの crate の外側。ここでは
//! Trigger Runner と AutomateService が必要とする操作だけを定義する。

use async_trait::async_trait;

use crate::domain::{
    Action, ActionId, CallHistory, Condition, ConditionId, StoreError, Trigger, TriggerId,
};

#[async_trait]
pub trait AutomateStore: Send + Sync {
    async fn get_trigger(&self, id: TriggerId) -> Result<Option<Trigger>, StoreError>;

    async fn list_triggers(&self) -> Result<Vec<Trigger>, StoreError>;

    /// Insert or replace.
    async fn save_trigger(&self, trigger: &Trigger) -> Result<(), StoreError>;

    /// Deletes the trigger together with its conditions, actions and history.
    /// Returns `false` when nothing was stored under `id`.
    async fn delete_trigger(&self, id: TriggerId) -> Result<bool, StoreError>;

    /// Ascending priority, ties in insertion order.
    async fn conditions(&self, trigger: TriggerId) -> Result<Vec<Condition>, StoreError>;

    async fn get_condition(&self, id: ConditionId) -> Result<Option<Condition>, StoreError>;

    async fn save_condition(&self, condition: &Condition) -> Result<(), StoreError>;

    async fn delete_condition(&self, id: ConditionId) -> Result<bool, StoreError>;

    /// Ascending priority, ties in insertion order.
    async fn actions(&self, trigger: TriggerId) -> Result<Vec<Action>, StoreError>;

    async fn get_action(&self, id: ActionId) -> Result<Option<Action>, StoreError>;

    async fn save_action(&self, action: &Action) -> Result<(), StoreError>;

    async fn delete_action(&self, id: ActionId) -> Result<bool, StoreError>;

    async fn append_history(&self, entry: &CallHistory) -> Result<(), StoreError>;

    /// Oldest first.
    async fn history(&self, trigger: TriggerId) -> Result<Vec<CallHistory>, StoreError>;
}
