//! Condition Evaluator - condition handler の登録と評価
//!
//! # 二層構造（typed と同じ）
//! - **表層**: `ConditionHandler`（`TYPE` と `Params` を持つ）
//! - **内部**: `DynCondition`（raw JSON を受け取る object-safe 版）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Condition, ConditionType, SpindleError, ValidationError};
use crate::typed::{Params, RegistryError};

/// 1 種類の condition
///
/// `evaluate` は外部状態を読むだけで、同じ run の他の condition から見える
/// 副作用を持ってはいけない。
#[async_trait]
pub trait ConditionHandler: Send + Sync + 'static {
    const TYPE: ConditionType;
    type Params: Params;

    async fn evaluate(&self, params: Self::Params) -> Result<bool, SpindleError>;
}

#[async_trait]
pub trait DynCondition: Send + Sync {
    fn condition_type(&self) -> ConditionType;
    fn verify(&self, raw: &serde_json::Value) -> Result<(), ValidationError>;
    async fn evaluate_raw(&self, raw: &serde_json::Value) -> Result<bool, SpindleError>;
}

struct TypedCondition<C>(C);

#[async_trait]
impl<C: ConditionHandler> DynCondition for TypedCondition<C> {
    fn condition_type(&self) -> ConditionType {
        C::TYPE
    }

    fn verify(&self, raw: &serde_json::Value) -> Result<(), ValidationError> {
        C::Params::parse(raw).map(|_| ())
    }

    async fn evaluate_raw(&self, raw: &serde_json::Value) -> Result<bool, SpindleError> {
        let params = C::Params::parse(raw)?;
        self.0.evaluate(params).await
    }
}

#[derive(Default)]
pub struct Evaluator {
    handlers: HashMap<ConditionType, Arc<dyn DynCondition>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: ConditionHandler>(&mut self, handler: C) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&C::TYPE) {
            return Err(RegistryError::AlreadyRegistered(C::TYPE.to_string()));
        }
        self.handlers.insert(C::TYPE, Arc::new(TypedCondition(handler)));
        Ok(())
    }

    pub fn resolve(&self, kind: ConditionType) -> Result<Arc<dyn DynCondition>, RegistryError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(kind.to_string()))
    }

    pub fn registered_types(&self) -> Vec<ConditionType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Lookup + parse + evaluate.
    ///
    /// 未登録の type と不正な params は Permanent エラーになる。
    pub async fn evaluate(&self, condition: &Condition) -> Result<bool, SpindleError> {
        let handler = self
            .resolve(condition.kind)
            .map_err(|e| SpindleError::permanent(e.to_string()))?;
        let result = handler.evaluate_raw(&condition.params).await;
        tracing::debug!(
            condition_id = %condition.id,
            kind = %condition.kind,
            priority = condition.priority,
            result = ?result,
            "condition evaluated"
        );
        result
    }
}
