//! AutomateService - trigger / condition / action の作成・更新・削除
//!
//! 保存前に params を registry で検証し、ContractEvent trigger の
//! webhook 購読を trigger のライフサイクルに合わせて張り替える。

use std::sync::Arc;

use super::evaluator::Evaluator;
use super::executor::Executor;
use super::schedule::ScheduleTemplate;
use crate::domain::{
    Action, ActionId, ActionType, CallHistory, Condition, ConditionId, ConditionType, SpindleError,
    StoreError, Trigger, TriggerId, TriggerKind, ValidationError, WalletId,
};
use crate::ports::{AutomateStore, Clock, EventSubscriber};
use crate::typed::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum AutomateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("event subscription failed: {0}")]
    Subscription(SpindleError),
}

/// Partial trigger update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TriggerUpdate {
    pub name: Option<String>,
    pub kind: Option<TriggerKind>,
    pub active: Option<bool>,
}

pub struct AutomateService {
    store: Arc<dyn AutomateStore>,
    evaluator: Arc<Evaluator>,
    executor: Arc<Executor>,
    subscriber: Arc<dyn EventSubscriber>,
    clock: Arc<dyn Clock>,
}

impl AutomateService {
    pub fn new(
        store: Arc<dyn AutomateStore>,
        evaluator: Arc<Evaluator>,
        executor: Arc<Executor>,
        subscriber: Arc<dyn EventSubscriber>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            evaluator,
            executor,
            subscriber,
            clock,
        }
    }

    // ------------------------------------------------------------------
    // triggers
    // ------------------------------------------------------------------

    pub async fn create_trigger(
        &self,
        wallet: WalletId,
        name: impl Into<String>,
        kind: TriggerKind,
    ) -> Result<Trigger, AutomateError> {
        let name = name.into();
        verify_trigger(&name, &kind)?;
        let kind = self.subscribe(kind).await?;
        let trigger = Trigger::new(wallet, name, kind, self.clock.now());
        self.store.save_trigger(&trigger).await?;
        tracing::info!(trigger_id = %trigger.id, kind = trigger.kind.name(), "trigger created");
        Ok(trigger)
    }

    pub async fn update_trigger(
        &self,
        id: TriggerId,
        update: TriggerUpdate,
    ) -> Result<Trigger, AutomateError> {
        let mut trigger = self.require_trigger(id).await?;

        if let Some(name) = update.name {
            trigger.name = name;
        }
        if let Some(kind) = update.kind {
            verify_trigger(&trigger.name, &kind)?;
            if trigger.kind.same_source(&kind) {
                // 同じ購読元なら subscription はそのまま
                let kept = match &trigger.kind {
                    TriggerKind::ContractEvent { subscription, .. } => subscription.clone(),
                    _ => None,
                };
                trigger.kind = with_subscription(kind, kept);
            } else {
                let kind = self.subscribe(kind).await?;
                self.unsubscribe(&trigger.kind).await;
                trigger.kind = kind;
            }
        } else {
            verify_trigger(&trigger.name, &trigger.kind)?;
        }
        if let Some(active) = update.active {
            if active && !trigger.active {
                trigger.retries = 0;
            }
            trigger.active = active;
        }
        trigger.updated_at = self.clock.now();

        self.store.save_trigger(&trigger).await?;
        tracing::info!(trigger_id = %trigger.id, active = trigger.active, "trigger updated");
        Ok(trigger)
    }

    /// Conditions, actions and history go with it.
    pub async fn delete_trigger(&self, id: TriggerId) -> Result<bool, AutomateError> {
        let Some(trigger) = self.store.get_trigger(id).await? else {
            return Ok(false);
        };
        self.unsubscribe(&trigger.kind).await;
        let deleted = self.store.delete_trigger(id).await?;
        tracing::info!(trigger_id = %id, "trigger deleted");
        Ok(deleted)
    }

    pub async fn history(&self, id: TriggerId) -> Result<Vec<CallHistory>, AutomateError> {
        Ok(self.store.history(id).await?)
    }

    // ------------------------------------------------------------------
    // conditions
    // ------------------------------------------------------------------

    pub async fn add_condition(
        &self,
        trigger: TriggerId,
        kind: ConditionType,
        params: serde_json::Value,
        priority: i32,
    ) -> Result<Condition, AutomateError> {
        self.require_trigger(trigger).await?;
        self.evaluator.resolve(kind)?.verify(&params)?;
        let condition = Condition::new(trigger, kind, params, priority, self.clock.now());
        self.store.save_condition(&condition).await?;
        Ok(condition)
    }

    pub async fn update_condition(
        &self,
        id: ConditionId,
        params: Option<serde_json::Value>,
        priority: Option<i32>,
    ) -> Result<Condition, AutomateError> {
        let mut condition = self
            .store
            .get_condition(id)
            .await?
            .ok_or_else(|| AutomateError::NotFound(id.to_string()))?;
        if let Some(params) = params {
            self.evaluator.resolve(condition.kind)?.verify(&params)?;
            condition.params = params;
        }
        if let Some(priority) = priority {
            condition.priority = priority;
        }
        condition.updated_at = self.clock.now();
        self.store.save_condition(&condition).await?;
        Ok(condition)
    }

    pub async fn delete_condition(&self, id: ConditionId) -> Result<bool, AutomateError> {
        Ok(self.store.delete_condition(id).await?)
    }

    // ------------------------------------------------------------------
    // actions
    // ------------------------------------------------------------------

    pub async fn add_action(
        &self,
        trigger: TriggerId,
        kind: ActionType,
        params: serde_json::Value,
        priority: i32,
    ) -> Result<Action, AutomateError> {
        self.require_trigger(trigger).await?;
        self.executor.resolve(kind)?.verify(&params)?;
        let action = Action::new(trigger, kind, params, priority, self.clock.now());
        self.store.save_action(&action).await?;
        Ok(action)
    }

    pub async fn update_action(
        &self,
        id: ActionId,
        params: Option<serde_json::Value>,
        priority: Option<i32>,
    ) -> Result<Action, AutomateError> {
        let mut action = self
            .store
            .get_action(id)
            .await?
            .ok_or_else(|| AutomateError::NotFound(id.to_string()))?;
        if let Some(params) = params {
            self.executor.resolve(action.kind)?.verify(&params)?;
            action.params = params;
        }
        if let Some(priority) = priority {
            action.priority = priority;
        }
        action.updated_at = self.clock.now();
        self.store.save_action(&action).await?;
        Ok(action)
    }

    pub async fn delete_action(&self, id: ActionId) -> Result<bool, AutomateError> {
        Ok(self.store.delete_action(id).await?)
    }

    // ------------------------------------------------------------------

    async fn require_trigger(&self, id: TriggerId) -> Result<Trigger, AutomateError> {
        self.store
            .get_trigger(id)
            .await?
            .ok_or_else(|| AutomateError::NotFound(id.to_string()))
    }

    async fn subscribe(&self, kind: TriggerKind) -> Result<TriggerKind, AutomateError> {
        let TriggerKind::ContractEvent {
            network,
            address,
            event,
            ..
        } = &kind
        else {
            return Ok(kind);
        };
        let subscription = self
            .subscriber
            .subscribe(network, address, event)
            .await
            .map_err(AutomateError::Subscription)?;
        tracing::debug!(%network, %address, %event, %subscription, "event subscribed");
        Ok(with_subscription(kind, Some(subscription)))
    }

    /// 失敗しても trigger の変更は止めない（購読側の掃除は best effort）
    async fn unsubscribe(&self, kind: &TriggerKind) {
        if let TriggerKind::ContractEvent {
            subscription: Some(subscription),
            ..
        } = kind
            && let Err(err) = self.subscriber.unsubscribe(subscription).await
        {
            tracing::warn!(%subscription, error = %err, "event unsubscribe failed");
        }
    }
}

fn with_subscription(kind: TriggerKind, subscription: Option<String>) -> TriggerKind {
    match kind {
        TriggerKind::ContractEvent {
            network,
            address,
            event,
            ..
        } => TriggerKind::ContractEvent {
            network,
            address,
            event,
            subscription,
        },
        other => other,
    }
}

fn verify_trigger(name: &str, kind: &TriggerKind) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("name"));
    }
    if let TriggerKind::ContractEvent {
        network,
        address,
        event,
        ..
    } = kind
    {
        for (field, value) in [("network", network), ("address", address), ("event", event)] {
            if value.trim().is_empty() {
                return Err(ValidationError::new(field));
            }
        }
    }
    if let Some(template) = ScheduleTemplate::for_trigger(kind) {
        template.compile()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automate::actions::Notification;
    use crate::automate::conditions::EthereumGasPrice;
    use crate::impls::InMemoryAutomateStore;
    use crate::ports::FixedClock;
    use crate::test_support::{FakeChain, FakeSubscriber, RecordingNotifier};
    use chrono::Utc;
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryAutomateStore>,
        subscriber: Arc<FakeSubscriber>,
        service: AutomateService,
    }

    fn fixture() -> Fixture {
        let mut evaluator = Evaluator::new();
        evaluator
            .register(EthereumGasPrice::new(Arc::new(FakeChain::default())))
            .unwrap();
        let mut executor = Executor::new();
        executor
            .register(Notification::new(Arc::new(RecordingNotifier::default())))
            .unwrap();

        let store = Arc::new(InMemoryAutomateStore::default());
        let subscriber = Arc::new(FakeSubscriber::default());
        let service = AutomateService::new(
            store.clone(),
            Arc::new(evaluator),
            Arc::new(executor),
            subscriber.clone(),
            Arc::new(FixedClock::new(Utc::now())),
        );
        Fixture {
            store,
            subscriber,
            service,
        }
    }

    fn event(address: &str) -> TriggerKind {
        TriggerKind::ContractEvent {
            network: "1".into(),
            address: address.into(),
            event: "Transfer".into(),
            subscription: None,
        }
    }

    fn subscription(trigger: &Trigger) -> Option<String> {
        match &trigger.kind {
            TriggerKind::ContractEvent { subscription, .. } => subscription.clone(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn contract_event_trigger_lifecycle_manages_subscription() {
        let f = fixture();
        let trigger = f
            .service
            .create_trigger(WalletId::generate(), "watch", event("0xabc"))
            .await
            .unwrap();
        assert_eq!(subscription(&trigger).as_deref(), Some("sub-1"));

        // case-only change: same source, same subscription
        let same = f
            .service
            .update_trigger(trigger.id, TriggerUpdate { kind: Some(event("0xABC")), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(subscription(&same).as_deref(), Some("sub-1"));

        let moved = f
            .service
            .update_trigger(trigger.id, TriggerUpdate { kind: Some(event("0xdef")), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(subscription(&moved).as_deref(), Some("sub-2"));
        assert_eq!(f.subscriber.unsubscribed(), vec!["sub-1".to_string()]);

        assert!(f.service.delete_trigger(trigger.id).await.unwrap());
        assert_eq!(f.subscriber.unsubscribed(), vec!["sub-1".to_string(), "sub-2".to_string()]);
        assert!(!f.service.delete_trigger(trigger.id).await.unwrap());
    }

    #[tokio::test]
    async fn time_trigger_schedule_is_validated() {
        let f = fixture();
        let err = f
            .service
            .create_trigger(
                WalletId::generate(),
                "bad",
                TriggerKind::EveryDay { hour: 10, timezone: Some("Nowhere/Void".into()) },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid timezone"));
        assert!(f.subscriber.subscribed().is_empty());

        for (kind, field) in [
            (TriggerKind::EveryDay { hour: 24, timezone: None }, "hour"),
            (TriggerKind::EveryWeek { week_day: 7, hour: 9, timezone: None }, "weekDay"),
            (TriggerKind::EveryMonth { month_day: 32, hour: 9, timezone: None }, "day"),
        ] {
            let err = f
                .service
                .create_trigger(WalletId::generate(), "never", kind)
                .await
                .unwrap_err();
            assert!(err.to_string().starts_with(&format!("Invalid {field}")), "{err}");
        }
        assert!(f.store.list_triggers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn condition_and_action_params_are_checked_against_the_registry() {
        let f = fixture();
        let trigger = f
            .service
            .create_trigger(WalletId::generate(), "t", TriggerKind::EveryHour)
            .await
            .unwrap();

        let err = f
            .service
            .add_condition(trigger.id, ConditionType::EthereumGasPrice, json!({"network": "1", "op": "~", "value": 1}), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AutomateError::Validation(_)));

        let err = f
            .service
            .add_condition(trigger.id, ConditionType::ContractMetric, json!({}), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AutomateError::Registry(RegistryError::NotFound(_))));

        let condition = f
            .service
            .add_condition(trigger.id, ConditionType::EthereumGasPrice, json!({"network": "1", "op": "<", "value": 30}), 0)
            .await
            .unwrap();
        let updated = f.service.update_condition(condition.id, None, Some(4)).await.unwrap();
        assert_eq!(updated.priority, 4);

        let action = f
            .service
            .add_action(trigger.id, ActionType::Notification, json!({"contact": "tg:1", "message": "cheap"}), 0)
            .await
            .unwrap();
        let err = f
            .service
            .update_action(action.id, Some(json!({"contact": "", "message": "x"})), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid contact");

        assert!(f.service.delete_trigger(trigger.id).await.unwrap());
        assert!(f.store.conditions(trigger.id).await.unwrap().is_empty());
        assert!(f.store.actions(trigger.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reactivating_resets_retries() {
        let f = fixture();
        let mut trigger = f
            .service
            .create_trigger(WalletId::generate(), "t", TriggerKind::EveryHour)
            .await
            .unwrap();
        trigger.active = false;
        trigger.retries = 5;
        f.store.save_trigger(&trigger).await.unwrap();

        let trigger = f
            .service
            .update_trigger(trigger.id, TriggerUpdate { active: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert!(trigger.active);
        assert_eq!(trigger.retries, 0);
    }

    #[tokio::test]
    async fn unknown_trigger_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .add_action(TriggerId::generate(), ActionType::Notification, json!({}), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AutomateError::NotFound(_)));
    }
}
