//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::process::Process;
use super::task::Task;
use crate::domain::{SpindleError, TaskOutcome, TaskRecord, TaskType};

/// Handler は Process を受け取り、終端メソッドで作った TaskOutcome を返す
///
/// `Err` は `process.error(err)` と同じ扱い（ただし info / param は失われる）。
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, process: Process<T>) -> Result<TaskOutcome, SpindleError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// params の parse（ValidationError → Permanent）もここで行うので、
/// handler 本体には検証済みの型しか届かない。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, task: TaskRecord, now: DateTime<Utc>) -> TaskOutcome;
    fn task_type(&self) -> TaskType;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, task: TaskRecord, now: DateTime<Utc>) -> TaskOutcome {
        let params = match T::parse(&task.params) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(task_id = %task.id, handler = %task.handler, error = %err, "params rejected");
                return TaskOutcome::failed(&err.into());
            }
        };
        match self.handler.handle(Process::new(task, params, now)).await {
            Ok(outcome) => outcome,
            Err(err) => TaskOutcome::failed(&err),
        }
    }

    fn task_type(&self) -> TaskType {
        T::TYPE
    }
}
