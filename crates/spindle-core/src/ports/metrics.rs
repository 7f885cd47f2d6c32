//! MetricReader port - 保存済みの contract metric を読む

use async_trait::async_trait;

use crate::domain::SpindleError;

#[async_trait]
pub trait MetricReader: Send + Sync {
    /// Latest stored value of `metric` for `contract`, `None` if never collected.
    async fn latest(&self, contract: &str, metric: &str) -> Result<Option<f64>, SpindleError>;
}
