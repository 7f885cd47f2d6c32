//! AppBuilder - handler 登録とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use super::worker_loop::{Dispatcher, DispatcherSettings};
use crate::domain::{Decider, TaskType};
use crate::ports::{Clock, TaskStore};
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// AppBuilder は TypedRegistry を組み立てる
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<TriggerRun, _>(TriggerRunHandler::new(runner))?
///     .expect_tasks(&TaskType::ALL)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される task type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    registry: TypedRegistry,
    expected_tasks: Option<Vec<TaskType>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected_tasks: None,
        }
    }

    /// Handler を登録。同じ task type の二重登録はエラー。
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, task_types: &[TaskType]) -> Self {
        self.expected_tasks = Some(task_types.to_vec());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered_types = self.registry.registered_types();
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|x| !registered_types.contains(x))
                .map(|x| x.to_string())
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        tracing::debug!(registered = ?self.registry.registered_types(), "handler registry built");
        Ok(App {
            registry: Arc::new(self.registry),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 検証済みの registry
pub struct App {
    pub registry: Arc<TypedRegistry>,
}

impl App {
    pub fn dispatcher(
        &self,
        store: Arc<dyn TaskStore>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        settings: DispatcherSettings,
    ) -> Dispatcher {
        Dispatcher::new(store, self.registry.clone(), decider, clock, settings)
    }
}
