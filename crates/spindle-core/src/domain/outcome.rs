//! Outcome model: how a handler concluded one run of a task.
//!
//! An outcome is an immutable value. Handlers obtain one only through a
//! terminal call on `Process` (`done`, `later`, `error`), which consumes the
//! process, so a run cannot be concluded twice.

use chrono::{DateTime, Utc};

use super::errors::{ErrorKind, SpindleError};

/// The handler's declared conclusion.
#[derive(Debug, Clone, PartialEq)]
pub enum Conclusion {
    Done,
    /// Back to Pending with a new not-before time. Not counted as a failure.
    Later { at: DateTime<Utc> },
    Error { message: String, kind: ErrorKind },
}

impl Conclusion {
    pub fn name(&self) -> &'static str {
        match self {
            Conclusion::Done => "done",
            Conclusion::Later { .. } => "later",
            Conclusion::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    conclusion: Conclusion,
    params: Option<serde_json::Value>,
    info: Vec<String>,
}

impl TaskOutcome {
    pub(crate) fn new(
        conclusion: Conclusion,
        params: Option<serde_json::Value>,
        info: Vec<String>,
    ) -> Self {
        Self {
            conclusion,
            params,
            info,
        }
    }

    /// Outcome for a run that never reached a handler (or blew up inside one).
    pub(crate) fn failed(err: &SpindleError) -> Self {
        Self::new(
            Conclusion::Error {
                message: err.message().to_string(),
                kind: err.kind(),
            },
            None,
            Vec::new(),
        )
    }

    pub fn conclusion(&self) -> &Conclusion {
        &self.conclusion
    }

    pub fn params(&self) -> Option<&serde_json::Value> {
        self.params.as_ref()
    }

    pub fn info(&self) -> &[String] {
        &self.info
    }

    pub(crate) fn into_parts(self) -> (Conclusion, Option<serde_json::Value>, Vec<String>) {
        (self.conclusion, self.params, self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_keeps_kind() {
        let outcome = TaskOutcome::failed(&SpindleError::permanent("Invalid id"));
        assert_eq!(
            outcome.conclusion(),
            &Conclusion::Error {
                message: "Invalid id".into(),
                kind: ErrorKind::Permanent,
            }
        );
        assert_eq!(outcome.conclusion().name(), "error");
        assert!(outcome.params().is_none());
    }
}
