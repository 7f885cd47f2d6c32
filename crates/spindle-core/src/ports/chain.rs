//! Chain ports - ブロックチェーン側の協力者
//!
//! RPC アダプタ自体はこの crate の外にある。condition / action / handler は
//! 必要な trait だけをコンストラクタで受け取る。

use async_trait::async_trait;

use crate::domain::SpindleError;

/// 読み取り専用の chain 状態
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Native balance of `wallet` on `network`, in whole coins.
    async fn balance(&self, network: &str, wallet: &str) -> Result<f64, SpindleError>;

    /// Current gas price on `network`, in gwei.
    async fn gas_price(&self, network: &str) -> Result<f64, SpindleError>;
}

/// automation トランザクションの送信と receipt の確認
#[async_trait]
pub trait TransactionSender: Send + Sync {
    /// Broadcasts the automation call and returns the transaction hash.
    async fn send(&self, network: &str, automate: &str) -> Result<String, SpindleError>;

    /// `None` while pending, `Some(success)` once mined.
    async fn receipt(&self, network: &str, tx_hash: &str) -> Result<Option<bool>, SpindleError>;
}

/// contract event の webhook 購読
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns the subscription id to keep on the trigger.
    async fn subscribe(
        &self,
        network: &str,
        address: &str,
        event: &str,
    ) -> Result<String, SpindleError>;

    async fn unsubscribe(&self, subscription: &str) -> Result<(), SpindleError>;
}
