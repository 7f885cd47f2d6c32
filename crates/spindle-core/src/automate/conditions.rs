//! Built-in conditions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::evaluator::ConditionHandler;
use super::schedule::ScheduleTemplate;
use crate::domain::{ConditionType, SpindleError, ValidationError};
use crate::ports::{ChainReader, Clock, MetricReader};
use crate::typed::Params;
use crate::typed::task::require_non_empty;

/// 数値比較の演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Gte => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Lte => lhs <= rhs,
            Comparison::Eq => (lhs - rhs).abs() <= f64::EPSILON,
            Comparison::Ne => (lhs - rhs).abs() > f64::EPSILON,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        })
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::new(field));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// schedule
// ----------------------------------------------------------------------------

/// 現在時刻が schedule に一致するか
pub struct ScheduleCondition {
    clock: Arc<dyn Clock>,
}

impl ScheduleCondition {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl ConditionHandler for ScheduleCondition {
    const TYPE: ConditionType = ConditionType::Schedule;
    type Params = ScheduleTemplate;

    async fn evaluate(&self, params: ScheduleTemplate) -> Result<bool, SpindleError> {
        Ok(params.compile()?.matches(self.clock.now()))
    }
}

// ----------------------------------------------------------------------------
// ethereumBalance
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceParams {
    pub network: String,
    pub wallet: String,
    pub op: Comparison,
    pub value: f64,
}

impl Params for BalanceParams {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("network", &self.network)?;
        require_non_empty("wallet", &self.wallet)?;
        require_finite("value", self.value)
    }
}

pub struct EthereumBalance {
    chain: Arc<dyn ChainReader>,
}

impl EthereumBalance {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ConditionHandler for EthereumBalance {
    const TYPE: ConditionType = ConditionType::EthereumBalance;
    type Params = BalanceParams;

    async fn evaluate(&self, params: BalanceParams) -> Result<bool, SpindleError> {
        let balance = self.chain.balance(&params.network, &params.wallet).await?;
        Ok(params.op.apply(balance, params.value))
    }
}

// ----------------------------------------------------------------------------
// ethereumGasPrice
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceParams {
    pub network: String,
    pub op: Comparison,
    /// gwei
    pub value: f64,
}

impl Params for GasPriceParams {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("network", &self.network)?;
        require_finite("value", self.value)
    }
}

pub struct EthereumGasPrice {
    chain: Arc<dyn ChainReader>,
}

impl EthereumGasPrice {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ConditionHandler for EthereumGasPrice {
    const TYPE: ConditionType = ConditionType::EthereumGasPrice;
    type Params = GasPriceParams;

    async fn evaluate(&self, params: GasPriceParams) -> Result<bool, SpindleError> {
        let gas_price = self.chain.gas_price(&params.network).await?;
        Ok(params.op.apply(gas_price, params.value))
    }
}

// ----------------------------------------------------------------------------
// contractMetric
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricParams {
    pub contract: String,
    pub metric: String,
    pub op: Comparison,
    pub value: f64,
}

impl Params for MetricParams {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("contract", &self.contract)?;
        require_non_empty("metric", &self.metric)?;
        require_finite("value", self.value)
    }
}

pub struct ContractMetric {
    metrics: Arc<dyn MetricReader>,
}

impl ContractMetric {
    pub fn new(metrics: Arc<dyn MetricReader>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl ConditionHandler for ContractMetric {
    const TYPE: ConditionType = ConditionType::ContractMetric;
    type Params = MetricParams;

    async fn evaluate(&self, params: MetricParams) -> Result<bool, SpindleError> {
        let latest = self.metrics.latest(&params.contract, &params.metric).await?;
        // 未収集の metric は false
        Ok(latest.is_some_and(|v| params.op.apply(v, params.value)))
    }
}
