//! テスト用の collaborator fakes

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::SpindleError;
use crate::ports::{ChainReader, EventSubscriber, MetricReader, Notifier, TransactionSender};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Balances and gas prices set by the test. Unknown keys are RPC errors.
#[derive(Default)]
pub struct FakeChain {
    balances: Mutex<HashMap<(String, String), f64>>,
    gas_prices: Mutex<HashMap<String, f64>>,
}

impl FakeChain {
    pub fn set_balance(&self, network: &str, wallet: &str, value: f64) {
        lock(&self.balances).insert((network.to_string(), wallet.to_lowercase()), value);
    }

    pub fn set_gas_price(&self, network: &str, gwei: f64) {
        lock(&self.gas_prices).insert(network.to_string(), gwei);
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn balance(&self, network: &str, wallet: &str) -> Result<f64, SpindleError> {
        lock(&self.balances)
            .get(&(network.to_string(), wallet.to_lowercase()))
            .copied()
            .ok_or_else(|| SpindleError::transient(format!("no balance for {wallet} on {network}")))
    }

    async fn gas_price(&self, network: &str) -> Result<f64, SpindleError> {
        lock(&self.gas_prices)
            .get(network)
            .copied()
            .ok_or_else(|| SpindleError::transient(format!("network {network} unreachable")))
    }
}

#[derive(Default)]
pub struct FakeMetrics {
    values: Mutex<HashMap<(String, String), f64>>,
}

impl FakeMetrics {
    pub fn set(&self, contract: &str, metric: &str, value: f64) {
        lock(&self.values).insert((contract.to_string(), metric.to_string()), value);
    }
}

#[async_trait]
impl MetricReader for FakeMetrics {
    async fn latest(&self, contract: &str, metric: &str) -> Result<Option<f64>, SpindleError> {
        Ok(lock(&self.values)
            .get(&(contract.to_string(), metric.to_string()))
            .copied())
    }
}

/// Hashes are `0xhash-1`, `0xhash-2`, ... in send order.
#[derive(Default)]
pub struct FakeSender {
    sent: Mutex<Vec<(String, String)>>,
    receipts: Mutex<HashMap<String, bool>>,
}

impl FakeSender {
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    pub fn set_receipt(&self, hash: &str, success: bool) {
        lock(&self.receipts).insert(hash.to_string(), success);
    }
}

#[async_trait]
impl TransactionSender for FakeSender {
    async fn send(&self, network: &str, automate: &str) -> Result<String, SpindleError> {
        let mut sent = lock(&self.sent);
        sent.push((network.to_string(), automate.to_string()));
        Ok(format!("0xhash-{}", sent.len()))
    }

    async fn receipt(&self, _network: &str, tx_hash: &str) -> Result<Option<bool>, SpindleError> {
        Ok(lock(&self.receipts).get(tx_hash).copied())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, contact: &str, message: &str) -> Result<(), SpindleError> {
        lock(&self.sent).push((contact.to_string(), message.to_string()));
        Ok(())
    }
}

/// Subscription ids are `sub-1`, `sub-2`, ...
#[derive(Default)]
pub struct FakeSubscriber {
    subscribed: Mutex<Vec<(String, String, String)>>,
    unsubscribed: Mutex<Vec<String>>,
}

impl FakeSubscriber {
    pub fn subscribed(&self) -> Vec<(String, String, String)> {
        lock(&self.subscribed).clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        lock(&self.unsubscribed).clone()
    }
}

#[async_trait]
impl EventSubscriber for FakeSubscriber {
    async fn subscribe(&self, network: &str, address: &str, event: &str) -> Result<String, SpindleError> {
        let mut subscribed = lock(&self.subscribed);
        subscribed.push((network.to_string(), address.to_string(), event.to_string()));
        Ok(format!("sub-{}", subscribed.len()))
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), SpindleError> {
        lock(&self.unsubscribed).push(subscription.to_string());
        Ok(())
    }
}
