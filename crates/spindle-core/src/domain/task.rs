//! Task record: one unit of queued work and its lifecycle state.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Topic used when a producer does not name one.
pub const DEFAULT_TOPIC: &str = "default";

/// Task lifecycle.
///
/// State transitions:
/// - Pending -> Process -> Done
/// - Pending -> Process -> Pending (later / transient retry)
/// - Pending -> Process -> Error (fatal, or attempts exhausted)
/// - Collision is assigned at push time and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Process,
    Done,
    Error,
    Collision,
}

impl TaskStatus {
    /// Pending or Process: the statuses that hold a collision sign.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Process)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Error | TaskStatus::Collision
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Process => "process",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::Collision => "collision",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "process" => Ok(TaskStatus::Process),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            "collision" => Ok(TaskStatus::Collision),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Producer-side knobs for `TaskStore::push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOptions {
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Not-before time; `None` means "now".
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    /// At most one in-flight task may carry a given sign.
    #[serde(default)]
    pub collision_sign: Option<String>,
    /// Watchers re-arm after failures instead of dying.
    #[serde(default)]
    pub watcher: bool,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            topic: default_topic(),
            start_at: None,
            collision_sign: None,
            watcher: false,
        }
    }
}

impl PushOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn with_collision_sign(mut self, sign: impl Into<String>) -> Self {
        self.collision_sign = Some(sign.into());
        self
    }

    pub fn watcher(mut self) -> Self {
        self.watcher = true;
        self
    }
}

/// The "single source of truth" for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    /// Registered handler name. Kept as a string so rows written by a newer
    /// producer still load; the registry reports unknown names.
    pub handler: String,
    pub params: serde_json::Value,
    pub status: TaskStatus,
    pub priority: i32,
    pub topic: String,
    pub collision_sign: Option<String>,
    pub start_at: DateTime<Utc>,
    /// Number of claims so far (including the current one while in Process).
    pub attempt: u32,
    pub execution_time_ms: Option<u64>,
    /// Append-only diagnostic log.
    pub info: String,
    pub error: Option<String>,
    pub watcher: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        handler: impl Into<String>,
        params: serde_json::Value,
        options: PushOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            handler: handler.into(),
            params,
            status: TaskStatus::Pending,
            priority: options.priority,
            topic: options.topic,
            collision_sign: options.collision_sign,
            start_at: options.start_at.unwrap_or(now),
            attempt: 0,
            execution_time_ms: None,
            info: String::new(),
            error: None,
            watcher: options.watcher,
            created_at: now,
            updated_at: now,
        }
    }

    /// Eligible for `claim_due` on one of `topics` at `now`.
    pub fn is_due(&self, topics: &[String], now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending
            && self.start_at <= now
            && topics.iter().any(|t| *t == self.topic)
    }

    /// Dispatch order key: higher priority, then earlier start, then older id.
    pub fn dispatch_key(&self) -> (std::cmp::Reverse<i32>, DateTime<Utc>, TaskId) {
        (std::cmp::Reverse(self.priority), self.start_at, self.id)
    }

    /// Pending -> Process.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Process;
        self.attempt += 1;
        self.updated_at = now;
    }

    /// Fold a handler report (params/info/timing) into the record.
    pub fn absorb(&mut self, report: &TaskReport) {
        if let Some(params) = &report.params {
            self.params = params.clone();
        }
        for line in &report.info {
            self.push_info(line);
        }
        self.execution_time_ms = Some(report.execution_time.as_millis() as u64);
        self.updated_at = report.finished_at;
    }

    pub fn push_info(&mut self, line: &str) {
        if !self.info.is_empty() {
            self.info.push('\n');
        }
        self.info.push_str(line);
    }

    pub fn mark_done(&mut self) {
        self.status = TaskStatus::Done;
    }

    pub fn mark_error(&mut self, error: String) {
        self.push_info(&error);
        self.status = TaskStatus::Error;
        self.error = Some(error);
    }

    /// Back to Pending. `rearm` restarts the attempt counter: the handler
    /// asked for `later`, so the next claim is not a retry.
    pub fn reschedule(&mut self, start_at: DateTime<Utc>, rearm: bool) {
        if rearm {
            self.attempt = 0;
        }
        self.status = TaskStatus::Pending;
        self.start_at = start_at;
    }
}

/// What a push did.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// A new Pending task.
    Queued(TaskRecord),
    /// Lost the collision-sign race. The request is kept as a `Collision`
    /// row for auditing and never runs.
    Collided { task: TaskRecord, existing: TaskId },
}

impl PushOutcome {
    pub fn task(&self) -> &TaskRecord {
        match self {
            PushOutcome::Queued(task) => task,
            PushOutcome::Collided { task, .. } => task,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, PushOutcome::Queued(_))
    }
}

/// Handler-side results the dispatcher writes back alongside the new status.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub id: TaskId,
    /// Replacement params (`Process::param`).
    pub params: Option<serde_json::Value>,
    pub info: Vec<String>,
    pub execution_time: Duration,
    pub finished_at: DateTime<Utc>,
    /// Set for `later`; see `TaskRecord::reschedule`.
    pub rearm: bool,
}

impl TaskReport {
    pub fn new(id: TaskId, finished_at: DateTime<Utc>) -> Self {
        Self {
            id,
            params: None,
            info: Vec::new(),
            execution_time: Duration::ZERO,
            finished_at,
            rearm: false,
        }
    }
}

/// Counts by status for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub process: usize,
    pub done: usize,
    pub error: usize,
    pub collision: usize,
}

impl TaskCounts {
    pub fn add(&mut self, status: TaskStatus, n: usize) {
        match status {
            TaskStatus::Pending => self.pending += n,
            TaskStatus::Process => self.process += n,
            TaskStatus::Done => self.done += n,
            TaskStatus::Error => self.error += n,
            TaskStatus::Collision => self.collision += n,
        }
    }
}
