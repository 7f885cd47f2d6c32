//! automateContractEvent - 観測された contract event を trigger に配る

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::runner::{RunSettings, push_trigger_run};
use crate::domain::{SpindleError, TaskOutcome, TaskType, TriggerKind, ValidationError};
use crate::ports::{AutomateStore, TaskStore};
use crate::typed::task::require_non_empty;
use crate::typed::{Handler, Params, Process, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvent {
    pub network: String,
    pub address: String,
    pub event: String,
    /// Raw webhook body, kept for the task log only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Params for ContractEvent {
    fn verify(&self) -> Result<(), ValidationError> {
        require_non_empty("network", &self.network)?;
        require_non_empty("address", &self.address)?;
        require_non_empty("event", &self.event)
    }
}

impl Task for ContractEvent {
    const TYPE: TaskType = TaskType::AutomateContractEvent;
}

impl ContractEvent {
    fn source(&self) -> TriggerKind {
        TriggerKind::ContractEvent {
            network: self.network.clone(),
            address: self.address.clone(),
            event: self.event.clone(),
            subscription: None,
        }
    }
}

pub struct ContractEventHandler {
    automate: Arc<dyn AutomateStore>,
    tasks: Arc<dyn TaskStore>,
    settings: RunSettings,
}

impl ContractEventHandler {
    pub fn new(automate: Arc<dyn AutomateStore>, tasks: Arc<dyn TaskStore>, settings: RunSettings) -> Self {
        Self {
            automate,
            tasks,
            settings,
        }
    }
}

#[async_trait]
impl Handler<ContractEvent> for ContractEventHandler {
    async fn handle(&self, process: Process<ContractEvent>) -> Result<TaskOutcome, SpindleError> {
        let source = process.params().source();
        let mut queued = 0usize;
        for trigger in self.automate.list_triggers().await? {
            if !trigger.active || !trigger.kind.same_source(&source) {
                continue;
            }
            if push_trigger_run(self.tasks.as_ref(), trigger.id, &self.settings)
                .await?
                .is_queued()
            {
                queued += 1;
            }
        }

        let params = process.params();
        tracing::info!(
            network = %params.network,
            address = %params.address,
            event = %params.event,
            queued,
            "contract event dispatched"
        );
        Ok(process.info(format!("queued {queued}")).done())
    }
}
