//! Notifier port - 通知チャネル（email / Telegram など）への送信

use async_trait::async_trait;

use crate::domain::SpindleError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, contact: &str, message: &str) -> Result<(), SpindleError>;
}
