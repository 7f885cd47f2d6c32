//! Errors - エラー型と分類
//!
//! - `ErrorKind`: 運用上の分類（リトライするかどうかを決める）
//! - `SpindleError`: handler / condition / action が返すエラー
//! - `ValidationError`: params の形式エラー（常に Permanent）
//! - `StoreError`: TaskStore / AutomateStore のエラー

use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network/RPC hiccup: worth another attempt after a backoff.
    Transient,
    /// Retrying cannot help (malformed params, reverted transaction, ...).
    Permanent,
    /// Our own storage misbehaved; treated like `Transient` by the decider.
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// Malformed task/condition/action params.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}{}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct ValidationError {
    field: String,
    detail: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: None,
        }
    }

    pub fn with_detail(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Persistence failures shared by every store port.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored row could not be decoded: {0}")]
    Decode(String),

    /// The task is not in `Process` any more: someone else already applied an outcome
    /// (or the reaper took it back).
    #[error("task {0} is not in process")]
    NotInProcess(TaskId),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// SpindleError は handler が返すドメインエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpindleError {
    kind: ErrorKind,
    message: String,
}

impl SpindleError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for SpindleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SpindleError {}

impl From<ValidationError> for SpindleError {
    fn from(err: ValidationError) -> Self {
        Self::permanent(err.to_string())
    }
}

impl From<StoreError> for SpindleError {
    fn from(err: StoreError) -> Self {
        Self::new(ErrorKind::Infrastructure, err.to_string())
    }
}
