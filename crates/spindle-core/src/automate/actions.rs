//! Built-in actions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::executor::ActionHandler;
use super::transaction::TransactionRun;
use crate::domain::{ActionType, PushOptions, PushOutcome, SpindleError, ValidationError};
use crate::ports::{Notifier, TaskStore};
use crate::typed::task::require_non_empty;
use crate::typed::{Params, Task};

// ----------------------------------------------------------------------------
// notification
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParams {
    /// Contact id understood by the notifier (email, chat id, ...).
    pub contact: String,
    pub message: String,
}

impl Params for NotificationParams {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("contact", &self.contact)?;
        require_non_empty("message", &self.message)
    }
}

pub struct Notification {
    notifier: Arc<dyn Notifier>,
}

impl Notification {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl ActionHandler for Notification {
    const TYPE: ActionType = ActionType::Notification;
    type Params = NotificationParams;

    async fn execute(&self, params: NotificationParams) -> Result<(), SpindleError> {
        self.notifier.send(&params.contact, &params.message).await
    }
}

// ----------------------------------------------------------------------------
// ethereumAutomateRun
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomateRunParams {
    pub network: String,
    pub automate: String,
}

impl Params for AutomateRunParams {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("network", &self.network)?;
        require_non_empty("automate", &self.automate)
    }
}

/// automateTransactionRun を push するだけ。完了は待たない。
pub struct EthereumAutomateRun {
    tasks: Arc<dyn TaskStore>,
    topic: String,
}

impl EthereumAutomateRun {
    pub fn new(tasks: Arc<dyn TaskStore>, topic: impl Into<String>) -> Self {
        Self {
            tasks,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl ActionHandler for EthereumAutomateRun {
    const TYPE: ActionType = ActionType::EthereumAutomateRun;
    type Params = AutomateRunParams;

    async fn execute(&self, params: AutomateRunParams) -> Result<(), SpindleError> {
        let run = TransactionRun::new(params.network, params.automate);
        let options = PushOptions::default()
            .with_topic(self.topic.clone())
            .with_collision_sign(run.collision_sign());
        let raw = serde_json::to_value(&run)
            .map_err(|e| SpindleError::permanent(format!("params encode: {e}")))?;

        match self.tasks.push(TransactionRun::TYPE.as_str(), raw, options).await? {
            PushOutcome::Queued(task) => {
                tracing::info!(task_id = %task.id, network = %run.network, automate = %run.automate, "transaction run queued")
            }
            PushOutcome::Collided { existing, .. } => {
                tracing::info!(%existing, automate = %run.automate, "transaction run already in flight")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::ports::FixedClock;
    use crate::queue::InMemoryTaskStore;
    use crate::test_support::RecordingNotifier;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn notification_goes_through_the_notifier() {
        let notifier = Arc::new(RecordingNotifier::default());
        let action = Notification::new(notifier.clone());
        let params =
            NotificationParams::parse(&json!({"contact": "tg:42", "message": "gas is cheap"})).unwrap();
        action.execute(params).await.unwrap();
        assert_eq!(
            notifier.sent(),
            vec![("tg:42".to_string(), "gas is cheap".to_string())]
        );
    }

    #[tokio::test]
    async fn automate_run_pushes_one_transaction_task() {
        let store = Arc::new(InMemoryTaskStore::new(Arc::new(FixedClock::new(Utc::now()))));
        let action = EthereumAutomateRun::new(store.clone(), "chain");
        let params = || AutomateRunParams::parse(&json!({"network": "1", "automate": "0xA"})).unwrap();

        action.execute(params()).await.unwrap();
        // second run while the first is in flight is a no-op
        action.execute(params()).await.unwrap();

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.collision, 1);

        let task = store
            .claim_due(&["chain".to_string()], Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.handler, "automateTransactionRun");
        assert_eq!(task.status, TaskStatus::Process);
        assert_eq!(task.params, json!({"network": "1", "automate": "0xA"}));
    }
}
