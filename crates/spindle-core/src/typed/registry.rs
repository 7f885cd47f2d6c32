//! TypedRegistry - Handler の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権
//!
//! キーは閉じた enum (`TaskType`)。DB に入っている文字列は `resolve` で
//! 一度だけ enum に変換し、知らない名前は `RegistryError::NotFound` になる。

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use crate::domain::TaskType;

/// RegistryError は handler / condition / action レジストリ共通のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Handler '{0}' not found")]
    NotFound(String),
}

#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<TaskType, Arc<dyn DynHandler>>,
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&T::TYPE) {
            return Err(RegistryError::AlreadyRegistered(T::TYPE.to_string()));
        }
        self.handlers
            .insert(T::TYPE, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    /// `handler` 列の文字列から引く
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DynHandler>, RegistryError> {
        name.parse::<TaskType>()
            .ok()
            .and_then(|t| self.get(t))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SpindleError, TaskOutcome};
    use crate::typed::{Params, Process};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Run {}
    impl Params for Run {}
    impl Task for Run {
        const TYPE: TaskType = TaskType::AutomateTriggerRun;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Event {}
    impl Params for Event {}
    impl Task for Event {
        const TYPE: TaskType = TaskType::AutomateContractEvent;
    }

    struct Noop;

    #[async_trait]
    impl Handler<Run> for Noop {
        async fn handle(&self, process: Process<Run>) -> Result<TaskOutcome, SpindleError> {
            Ok(process.done())
        }
    }

    #[async_trait]
    impl Handler<Event> for Noop {
        async fn handle(&self, process: Process<Event>) -> Result<TaskOutcome, SpindleError> {
            Ok(process.done())
        }
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = TypedRegistry::new();
        registry.register::<Run, _>(Noop).unwrap();

        let handler = registry.resolve("automateTriggerRun").unwrap();
        assert_eq!(handler.task_type(), TaskType::AutomateTriggerRun);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TypedRegistry::new();
        registry.register::<Run, _>(Noop).unwrap();
        let result = registry.register::<Run, _>(Noop);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::AlreadyRegistered("automateTriggerRun".into())
        );
    }

    #[test]
    fn unknown_and_unregistered_names_are_not_found() {
        let mut registry = TypedRegistry::new();
        registry.register::<Run, _>(Noop).unwrap();

        assert!(matches!(registry.resolve("sendEmail"), Err(RegistryError::NotFound(n)) if n == "sendEmail"));
        assert!(matches!(
            registry.resolve("automateContractEvent"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = TypedRegistry::new();
        registry.register::<Event, _>(Noop).unwrap();
        registry.register::<Run, _>(Noop).unwrap();
        assert_eq!(
            registry.registered_types(),
            vec![TaskType::AutomateTriggerRun, TaskType::AutomateContractEvent]
        );
    }
}
