//! automateTransactionRun - automation トランザクションの送信と receipt の待ち合わせ
//!
//! 1 回目の run で送信して hash を `param` で保存し、以降は `later_in` で
//! receipt をポーリングする。ワーカーはその間ブロックしない。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{SpindleError, TaskOutcome, TaskType, ValidationError};
use crate::ports::TransactionSender;
use crate::typed::task::require_non_empty;
use crate::typed::{Handler, Params, Process, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRun {
    pub network: String,
    /// Automation contract address.
    pub automate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl TransactionRun {
    pub fn new(network: impl Into<String>, automate: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            automate: automate.into(),
            tx_hash: None,
        }
    }

    /// One in-flight transaction per automation contract.
    pub fn collision_sign(&self) -> String {
        format!(
            "{}:{}:{}",
            TaskType::AutomateTransactionRun,
            self.network,
            self.automate.to_lowercase()
        )
    }
}

impl Params for TransactionRun {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("network", &self.network)?;
        require_non_empty("automate", &self.automate)?;
        if let Some(hash) = &self.tx_hash {
            require_non_empty("txHash", hash)?;
        }
        Ok(())
    }
}

impl Task for TransactionRun {
    const TYPE: TaskType = TaskType::AutomateTransactionRun;
}

pub struct TransactionRunHandler {
    sender: Arc<dyn TransactionSender>,
    poll: chrono::Duration,
}

impl TransactionRunHandler {
    pub fn new(sender: Arc<dyn TransactionSender>, poll: chrono::Duration) -> Self {
        Self { sender, poll }
    }
}

#[async_trait]
impl Handler<TransactionRun> for TransactionRunHandler {
    async fn handle(&self, process: Process<TransactionRun>) -> Result<TaskOutcome, SpindleError> {
        let params = process.params().clone();

        let hash = match params.tx_hash.clone() {
            Some(hash) => hash,
            None => {
                let hash = self.sender.send(&params.network, &params.automate).await?;
                tracing::info!(task_id = %process.id(), network = %params.network, tx_hash = %hash, "automation transaction sent");
                let next = TransactionRun {
                    tx_hash: Some(hash.clone()),
                    ..params
                };
                return Ok(process
                    .info(format!("sent {hash}"))
                    .param(next)?
                    .later_in(self.poll));
            }
        };

        match self.sender.receipt(&params.network, &hash).await? {
            None => Ok(process.later_in(self.poll)),
            Some(true) => Ok(process.info(format!("mined {hash}")).done()),
            Some(false) => Ok(process.error(SpindleError::permanent(format!(
                "transaction {hash} reverted"
            )))),
        }
    }
}
