//! SpindleConfig - TOML の設定
//!
//! すべてのフィールドに serde default があるので、空ファイル（またはファイル無し）
//! でも動く設定になる。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_TOPIC, DefaultDecider};
use crate::queue::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpindleConfig {
    pub queue: QueueConfig,
    pub automate: AutomateConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl SpindleConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.topics.is_empty() {
            return Err(ConfigError::Invalid("queue.topics must not be empty".into()));
        }
        if self.queue.workers == 0 {
            return Err(ConfigError::Invalid("queue.workers must be at least 1".into()));
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue.max_attempts must be at least 1".into()));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("queue.poll_interval_ms must be at least 1".into()));
        }
        // 実行中の handler を reaper が Pending に戻してはいけない
        if self.queue.stale_after_secs <= self.queue.handler_timeout_secs {
            return Err(ConfigError::Invalid(
                "queue.stale_after_secs must be greater than queue.handler_timeout_secs".into(),
            ));
        }
        if self.automate.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid("automate.tick_interval_secs must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub topics: Vec<String>,
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub handler_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub reap_interval_secs: u64,
    /// Done / Error / Collision rows older than this are purged.
    pub retention_secs: u64,
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topics: vec![DEFAULT_TOPIC.to_string()],
            workers: 2,
            poll_interval_ms: 500,
            max_attempts: 5,
            handler_timeout_secs: 300,
            stale_after_secs: 900,
            reap_interval_secs: 60,
            retention_secs: 7 * 24 * 3600,
            retry: RetryConfig::default(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn decider(&self) -> DefaultDecider {
        DefaultDecider::new(self.retry.policy(), self.max_attempts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 3_600_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomateConfig {
    pub max_trigger_retries: u32,
    pub topic: String,
    pub run_priority: i32,
    pub transaction_poll_secs: u64,
    pub tick_interval_secs: u64,
}

impl Default for AutomateConfig {
    fn default() -> Self {
        Self {
            max_trigger_retries: 5,
            topic: DEFAULT_TOPIC.to_string(),
            run_priority: 0,
            transaction_poll_secs: 15,
            tick_interval_secs: 3600,
        }
    }
}

impl AutomateConfig {
    pub fn transaction_poll(&self) -> chrono::Duration {
        seconds(self.transaction_poll_secs)
    }

    pub fn tick_interval(&self) -> chrono::Duration {
        seconds(self.tick_interval_secs)
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file. In-memory task store when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
