//! Logging adapters for the collaborators spindle-core only defines as ports.
//!
//! Nothing here talks to a chain or a chat service. Reads fail (so conditions
//! that need them are recorded as not fired), writes are logged.

use async_trait::async_trait;
use spindle_core::domain::SpindleError;
use spindle_core::ports::{ChainReader, EventSubscriber, MetricReader, Notifier, TransactionSender};

#[derive(Debug, Default)]
pub struct LoggingChain;

#[async_trait]
impl ChainReader for LoggingChain {
    async fn balance(&self, network: &str, wallet: &str) -> Result<f64, SpindleError> {
        tracing::debug!(%network, %wallet, "balance requested");
        Err(SpindleError::transient(format!("no RPC configured for network {network}")))
    }

    async fn gas_price(&self, network: &str) -> Result<f64, SpindleError> {
        tracing::debug!(%network, "gas price requested");
        Err(SpindleError::transient(format!("no RPC configured for network {network}")))
    }
}

#[async_trait]
impl TransactionSender for LoggingChain {
    async fn send(&self, network: &str, automate: &str) -> Result<String, SpindleError> {
        tracing::warn!(%network, %automate, "transaction not sent: no signer configured");
        Err(SpindleError::permanent("no signer configured"))
    }

    async fn receipt(&self, network: &str, tx_hash: &str) -> Result<Option<bool>, SpindleError> {
        tracing::debug!(%network, %tx_hash, "receipt requested");
        Ok(None)
    }
}

#[async_trait]
impl EventSubscriber for LoggingChain {
    async fn subscribe(&self, network: &str, address: &str, event: &str) -> Result<String, SpindleError> {
        let subscription = format!("log:{network}:{}:{event}", address.to_lowercase());
        tracing::info!(%subscription, "event subscription");
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), SpindleError> {
        tracing::info!(%subscription, "event unsubscription");
        Ok(())
    }
}

#[async_trait]
impl MetricReader for LoggingChain {
    async fn latest(&self, contract: &str, metric: &str) -> Result<Option<f64>, SpindleError> {
        tracing::debug!(%contract, %metric, "metric requested");
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, contact: &str, message: &str) -> Result<(), SpindleError> {
        tracing::info!(%contact, %message, "notification");
        Ok(())
    }
}
