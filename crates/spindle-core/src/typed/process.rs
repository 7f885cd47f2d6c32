//! Process - 1 回の実行コンテキスト
//!
//! handler が run を終える方法はここにある終端メソッドだけ。
//! 終端メソッドは `self` を消費して `TaskOutcome` を返すので、二重に終わらせる
//! ことはコンパイル時に防がれる。
//!
//! ```ignore
//! async fn handle(&self, process: Process<Scan>) -> Result<TaskOutcome, SpindleError> {
//!     let next = Scan { from: process.params().from + 100, ..process.params().clone() };
//!     Ok(process.info("scanned 100 blocks").param(next)?.later_in(Duration::seconds(15)))
//! }
//! ```

use chrono::{DateTime, Utc};

use super::task::Params;
use crate::domain::{Conclusion, SpindleError, TaskId, TaskOutcome, TaskRecord};

pub struct Process<P> {
    task: TaskRecord,
    params: P,
    replaced: Option<serde_json::Value>,
    info: Vec<String>,
    now: DateTime<Utc>,
}

impl<P: Params> Process<P> {
    pub fn new(task: TaskRecord, params: P, now: DateTime<Utc>) -> Self {
        Self {
            task,
            params,
            replaced: None,
            info: Vec::new(),
            now,
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn task(&self) -> &TaskRecord {
        &self.task
    }

    /// 1-indexed; includes the current run.
    pub fn attempt(&self) -> u32 {
        self.task.attempt
    }

    /// Time the run was claimed.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// 診断用のテキストを追記（状態は変えない）
    pub fn info(mut self, msg: impl Into<String>) -> Self {
        self.info.push(msg.into());
        self
    }

    /// params を差し替える。次の `later` で保存される。
    pub fn param(mut self, params: P) -> Result<Self, SpindleError> {
        let raw = serde_json::to_value(&params)
            .map_err(|e| SpindleError::permanent(format!("params encode: {e}")))?;
        self.replaced = Some(raw);
        self.params = params;
        Ok(self)
    }

    pub fn done(self) -> TaskOutcome {
        self.conclude(Conclusion::Done)
    }

    /// Pending に戻す（失敗ではない）
    pub fn later(self, at: DateTime<Utc>) -> TaskOutcome {
        self.conclude(Conclusion::Later { at })
    }

    pub fn later_in(self, delay: chrono::Duration) -> TaskOutcome {
        let at = self
            .now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.later(at)
    }

    /// エラーを記録して終わる。リトライするかどうかは kind と decider が決める。
    pub fn error(self, err: impl Into<SpindleError>) -> TaskOutcome {
        let err = err.into();
        tracing::warn!(
            task_id = %self.task.id,
            handler = %self.task.handler,
            kind = ?err.kind(),
            error = %err,
            "handler reported error"
        );
        self.conclude(Conclusion::Error {
            message: err.message().to_string(),
            kind: err.kind(),
        })
    }

    fn conclude(self, conclusion: Conclusion) -> TaskOutcome {
        TaskOutcome::new(conclusion, self.replaced, self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, PushOptions, ValidationError};
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Cursor {
        block: u64,
    }

    impl Params for Cursor {}

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn process() -> Process<Cursor> {
        let record = TaskRecord::new(
            TaskId::generate(),
            "scan",
            json!({"block": 1}),
            PushOptions::default(),
            now(),
        );
        Process::new(record, Cursor { block: 1 }, now())
    }

    #[test]
    fn later_in_carries_info_and_new_params() {
        let outcome = process()
            .info("scanned")
            .param(Cursor { block: 101 })
            .unwrap()
            .later_in(chrono::Duration::seconds(15));

        assert_eq!(
            outcome.conclusion(),
            &Conclusion::Later {
                at: now() + chrono::Duration::seconds(15)
            }
        );
        assert_eq!(outcome.params(), Some(&json!({"block": 101})));
        assert_eq!(outcome.info().to_vec(), vec!["scanned".to_string()]);
    }

    #[test]
    fn done_without_param_leaves_params_untouched() {
        let outcome = process().done();
        assert_eq!(outcome.conclusion(), &Conclusion::Done);
        assert!(outcome.params().is_none());
    }

    #[test]
    fn validation_error_is_permanent() {
        let outcome = process().error(ValidationError::new("network"));
        assert_eq!(
            outcome.conclusion(),
            &Conclusion::Error {
                message: "Invalid network".into(),
                kind: ErrorKind::Permanent,
            }
        );
    }
}
