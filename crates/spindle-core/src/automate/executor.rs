//! Action Executor - action handler の登録と実行
//!
//! action は失敗してよい（エラーは call history に残る）し、
//! 別の Task を push してよい。push した Task の完了は待たない。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Action, ActionType, SpindleError, ValidationError};
use crate::typed::{Params, RegistryError};

#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    const TYPE: ActionType;
    type Params: Params;

    async fn execute(&self, params: Self::Params) -> Result<(), SpindleError>;
}

#[async_trait]
pub trait DynAction: Send + Sync {
    fn action_type(&self) -> ActionType;
    fn verify(&self, raw: &serde_json::Value) -> Result<(), ValidationError>;
    async fn execute_raw(&self, raw: &serde_json::Value) -> Result<(), SpindleError>;
}

struct TypedAction<A>(A);

#[async_trait]
impl<A: ActionHandler> DynAction for TypedAction<A> {
    fn action_type(&self) -> ActionType {
        A::TYPE
    }

    fn verify(&self, raw: &serde_json::Value) -> Result<(), ValidationError> {
        A::Params::parse(raw).map(|_| ())
    }

    async fn execute_raw(&self, raw: &serde_json::Value) -> Result<(), SpindleError> {
        let params = A::Params::parse(raw)?;
        self.0.execute(params).await
    }
}

#[derive(Default)]
pub struct Executor {
    handlers: HashMap<ActionType, Arc<dyn DynAction>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: ActionHandler>(&mut self, handler: A) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&A::TYPE) {
            return Err(RegistryError::AlreadyRegistered(A::TYPE.to_string()));
        }
        self.handlers.insert(A::TYPE, Arc::new(TypedAction(handler)));
        Ok(())
    }

    pub fn resolve(&self, kind: ActionType) -> Result<Arc<dyn DynAction>, RegistryError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(kind.to_string()))
    }

    pub fn registered_types(&self) -> Vec<ActionType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub async fn execute(&self, action: &Action) -> Result<(), SpindleError> {
        let handler = self
            .resolve(action.kind)
            .map_err(|e| SpindleError::permanent(e.to_string()))?;
        let result = handler.execute_raw(&action.params).await;
        match &result {
            Ok(()) => tracing::debug!(action_id = %action.id, kind = %action.kind, "action executed"),
            Err(err) => tracing::warn!(action_id = %action.id, kind = %action.kind, error = %err, "action failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TriggerId;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize)]
    struct Say {
        text: String,
    }
    impl Params for Say {}

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl ActionHandler for Recorder {
        const TYPE: ActionType = ActionType::Notification;
        type Params = Say;

        async fn execute(&self, params: Say) -> Result<(), SpindleError> {
            if params.text.is_empty() {
                return Err(SpindleError::transient("smtp down"));
            }
            self.0.lock().unwrap().push(params.text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn executes_with_parsed_params() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut executor = Executor::new();
        executor.register(Recorder(seen.clone())).unwrap();

        let action = Action::new(
            TriggerId::generate(),
            ActionType::Notification,
            json!({"text": "hi"}),
            0,
            Utc::now(),
        );
        executor.execute(&action).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["hi".to_string()]);

        let failing = Action {
            params: json!({"text": ""}),
            ..action.clone()
        };
        assert_eq!(
            executor.execute(&failing).await.unwrap_err().message(),
            "smtp down"
        );
        assert!(executor.resolve(ActionType::EthereumAutomateRun).is_err());
    }
}
