//! InMemoryAutomateStore - 開発用の AutomateStore
//!
//! # 実装詳細
//! - trigger は HashMap、condition / action / history は Vec
//!   （Vec の並びがそのまま insertion order になる）
//! - 1 操作 = 1 回の lock

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Action, ActionId, CallHistory, Condition, ConditionId, StoreError, Trigger, TriggerId,
};
use crate::ports::AutomateStore;

#[derive(Default)]
struct State {
    triggers: HashMap<TriggerId, Trigger>,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
    history: Vec<CallHistory>,
}

#[derive(Default)]
pub struct InMemoryAutomateStore {
    state: Mutex<State>,
}

impl InMemoryAutomateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 既存 id なら置き換え（位置は保つ）、なければ末尾に追加
fn upsert<T: Clone, K: PartialEq>(items: &mut Vec<T>, item: &T, key: impl Fn(&T) -> K) {
    let id = key(item);
    match items.iter_mut().find(|existing| key(existing) == id) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}

fn remove<T, K: PartialEq>(items: &mut Vec<T>, id: K, key: impl Fn(&T) -> K) -> bool {
    let before = items.len();
    items.retain(|item| key(item) != id);
    items.len() != before
}

#[async_trait]
impl AutomateStore for InMemoryAutomateStore {
    async fn get_trigger(&self, id: TriggerId) -> Result<Option<Trigger>, StoreError> {
        Ok(self.state.lock().await.triggers.get(&id).cloned())
    }

    async fn list_triggers(&self) -> Result<Vec<Trigger>, StoreError> {
        let state = self.state.lock().await;
        let mut triggers: Vec<_> = state.triggers.values().cloned().collect();
        triggers.sort_by_key(|t| t.id);
        Ok(triggers)
    }

    async fn save_trigger(&self, trigger: &Trigger) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .triggers
            .insert(trigger.id, trigger.clone());
        Ok(())
    }

    async fn delete_trigger(&self, id: TriggerId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.triggers.remove(&id).is_none() {
            return Ok(false);
        }
        state.conditions.retain(|c| c.trigger != id);
        state.actions.retain(|a| a.trigger != id);
        state.history.retain(|h| h.trigger != id);
        Ok(true)
    }

    async fn conditions(&self, trigger: TriggerId) -> Result<Vec<Condition>, StoreError> {
        let state = self.state.lock().await;
        let mut conditions: Vec<_> = state
            .conditions
            .iter()
            .filter(|c| c.trigger == trigger)
            .cloned()
            .collect();
        // stable: 同じ priority は insertion order のまま
        conditions.sort_by_key(|c| c.priority);
        Ok(conditions)
    }

    async fn get_condition(&self, id: ConditionId) -> Result<Option<Condition>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.conditions.iter().find(|c| c.id == id).cloned())
    }

    async fn save_condition(&self, condition: &Condition) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        upsert(&mut state.conditions, condition, |c| c.id);
        Ok(())
    }

    async fn delete_condition(&self, id: ConditionId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(remove(&mut state.conditions, id, |c| c.id))
    }

    async fn actions(&self, trigger: TriggerId) -> Result<Vec<Action>, StoreError> {
        let state = self.state.lock().await;
        let mut actions: Vec<_> = state
            .actions
            .iter()
            .filter(|a| a.trigger == trigger)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.priority);
        Ok(actions)
    }

    async fn get_action(&self, id: ActionId) -> Result<Option<Action>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.actions.iter().find(|a| a.id == id).cloned())
    }

    async fn save_action(&self, action: &Action) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        upsert(&mut state.actions, action, |a| a.id);
        Ok(())
    }

    async fn delete_action(&self, id: ActionId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(remove(&mut state.actions, id, |a| a.id))
    }

    async fn append_history(&self, entry: &CallHistory) -> Result<(), StoreError> {
        self.state.lock().await.history.push(entry.clone());
        Ok(())
    }

    async fn history(&self, trigger: TriggerId) -> Result<Vec<CallHistory>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.trigger == trigger)
            .cloned()
            .collect())
    }
}
