//! Rules file: trigger definitions loaded at start-up.
//!
//! ```json
//! { "triggers": [
//!   { "name": "cheap gas", "type": "everyHour",
//!     "conditions": [{ "type": "ethereumGasPrice", "params": { "network": "1", "op": "<", "value": 20 } }],
//!     "actions": [{ "type": "notification", "params": { "contact": "tg:1", "message": "gas is cheap" } }] }
//! ] }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use spindle_core::automate::AutomateService;
use spindle_core::domain::{ActionType, ConditionType, TriggerKind, WalletId};

#[derive(Debug, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRule {
    #[serde(default)]
    pub wallet: Option<WalletId>,
    pub name: String,
    #[serde(flatten)]
    pub kind: TriggerKind,
    #[serde(default)]
    pub conditions: Vec<Step<ConditionType>>,
    #[serde(default)]
    pub actions: Vec<Step<ActionType>>,
}

#[derive(Debug, Deserialize)]
pub struct Step<K> {
    #[serde(rename = "type")]
    pub kind: K,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
}

pub fn read(path: &Path) -> anyhow::Result<RulesFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid rules {}", path.display()))
}

/// Creates every trigger through the service; returns how many were loaded.
pub async fn install(service: &AutomateService, rules: RulesFile) -> anyhow::Result<usize> {
    let count = rules.triggers.len();
    for rule in rules.triggers {
        let wallet = rule.wallet.unwrap_or_else(WalletId::generate);
        let trigger = service
            .create_trigger(wallet, rule.name.clone(), rule.kind)
            .await
            .with_context(|| format!("trigger '{}'", rule.name))?;
        for step in rule.conditions {
            service
                .add_condition(trigger.id, step.kind, step.params, step.priority)
                .await
                .with_context(|| format!("trigger '{}': condition {}", rule.name, step.kind))?;
        }
        for step in rule.actions {
            service
                .add_action(trigger.id, step.kind, step.params, step.priority)
                .await
                .with_context(|| format!("trigger '{}': action {}", rule.name, step.kind))?;
        }
        tracing::info!(trigger_id = %trigger.id, name = %rule.name, "trigger loaded");
    }
    Ok(count)
}
