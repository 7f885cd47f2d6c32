//! SQLite task store.
//!
//! Several worker processes may share one database file. Coordination is done
//! entirely with conditional statements:
//! - claim: `UPDATE ... WHERE id = (SELECT ... LIMIT 1) AND status = 'pending'`
//! - collision: partial unique index on in-flight `collision_sign`
//! - outcomes: only rows still in `process` are touched
//!
//! rusqlite は同期 API なので、すべて `spawn_blocking` の中で実行する。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};

use crate::domain::{
    PushOptions, PushOutcome, StoreError, TaskCounts, TaskId, TaskRecord, TaskReport, TaskStatus,
};
use crate::ports::{Clock, IdGenerator, TaskStore, UlidGenerator, next_id};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id                TEXT PRIMARY KEY,
    handler           TEXT NOT NULL,
    params            TEXT NOT NULL,
    status            TEXT NOT NULL,
    priority          INTEGER NOT NULL,
    topic             TEXT NOT NULL,
    collision_sign    TEXT,
    start_at          INTEGER NOT NULL,
    attempt           INTEGER NOT NULL DEFAULT 0,
    execution_time_ms INTEGER,
    info              TEXT NOT NULL DEFAULT '',
    error             TEXT,
    watcher           INTEGER NOT NULL DEFAULT 0,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS tasks_in_flight_sign
    ON tasks (collision_sign)
    WHERE collision_sign IS NOT NULL AND status IN ('pending', 'process');
CREATE INDEX IF NOT EXISTS tasks_due
    ON tasks (status, topic, priority DESC, start_at, id);
";

const COLUMNS: &str = "id, handler, params, status, priority, topic, collision_sign, start_at, \
     attempt, execution_time_ms, info, error, watcher, created_at, updated_at";

/// Durable task store backed by a single SQLite database.
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl SqliteTaskStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::with_connection(conn, clock)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
            ids,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection mutex poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }

    async fn finish(
        &self,
        report: TaskReport,
        apply: impl FnOnce(&mut TaskRecord) + Send + 'static,
    ) -> Result<TaskRecord, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = load(&tx, report.id)?
                .ok_or_else(|| StoreError::NotFound(report.id.to_string()))?;
            if record.status != TaskStatus::Process {
                return Err(StoreError::NotInProcess(report.id));
            }
            record.absorb(&report);
            apply(&mut record);

            let changed = tx.execute(
                "UPDATE tasks
                    SET status = ?2, params = ?3, start_at = ?4, execution_time_ms = ?5,
                        info = ?6, error = ?7, updated_at = ?8, attempt = ?9
                  WHERE id = ?1 AND status = 'process'",
                params![
                    record.id.as_ulid().to_string(),
                    record.status.as_str(),
                    serde_json::to_string(&record.params)?,
                    record.start_at.timestamp_millis(),
                    record.execution_time_ms.map(|ms| ms as i64),
                    record.info,
                    record.error,
                    record.updated_at.timestamp_millis(),
                    record.attempt,
                ],
            )?;
            if changed != 1 {
                return Err(StoreError::NotInProcess(report.id));
            }
            tx.commit()?;
            Ok(record)
        })
        .await
    }
}

fn insert(conn: &Connection, record: &TaskRecord) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO tasks ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            record.id.as_ulid().to_string(),
            record.handler,
            record.params.to_string(),
            record.status.as_str(),
            record.priority,
            record.topic,
            record.collision_sign,
            record.start_at.timestamp_millis(),
            record.attempt,
            record.execution_time_ms.map(|ms| ms as i64),
            record.info,
            record.error,
            record.watcher,
            record.created_at.timestamp_millis(),
            record.updated_at.timestamp_millis(),
        ],
    )
}

fn load(conn: &Connection, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
            params![id.as_ulid().to_string()],
            RawTask::from_row,
        )
        .optional()?;
    raw.map(TaskRecord::try_from).transpose()
}

fn in_flight_holder(conn: &Connection, sign: &str) -> Result<Option<TaskId>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT id FROM tasks
              WHERE collision_sign = ?1 AND status IN ('pending', 'process')",
            params![sign],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| s.parse::<TaskId>().map_err(|e| StoreError::Decode(e.to_string())))
        .transpose()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Column values as SQLite hands them back.
struct RawTask {
    id: String,
    handler: String,
    params: String,
    status: String,
    priority: i32,
    topic: String,
    collision_sign: Option<String>,
    start_at: i64,
    attempt: u32,
    execution_time_ms: Option<i64>,
    info: String,
    error: Option<String>,
    watcher: bool,
    created_at: i64,
    updated_at: i64,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            handler: row.get(1)?,
            params: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            topic: row.get(5)?,
            collision_sign: row.get(6)?,
            start_at: row.get(7)?,
            attempt: row.get(8)?,
            execution_time_ms: row.get(9)?,
            info: row.get(10)?,
            error: row.get(11)?,
            watcher: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

fn millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {ms}")))
}

impl TryFrom<RawTask> for TaskRecord {
    type Error = StoreError;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        Ok(TaskRecord {
            id: raw
                .id
                .parse()
                .map_err(|e: crate::domain::ParseIdError| StoreError::Decode(e.to_string()))?,
            handler: raw.handler,
            params: serde_json::from_str(&raw.params)?,
            status: raw.status.parse().map_err(StoreError::Decode)?,
            priority: raw.priority,
            topic: raw.topic,
            collision_sign: raw.collision_sign,
            start_at: millis(raw.start_at)?,
            attempt: raw.attempt,
            execution_time_ms: raw.execution_time_ms.map(|ms| ms.max(0) as u64),
            info: raw.info,
            error: raw.error,
            watcher: raw.watcher,
            created_at: millis(raw.created_at)?,
            updated_at: millis(raw.updated_at)?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn push(
        &self,
        handler: &str,
        params: serde_json::Value,
        options: PushOptions,
    ) -> Result<PushOutcome, StoreError> {
        let now = self.clock.now();
        let mut record = TaskRecord::new(next_id(self.ids.as_ref()), handler, params, options, now);

        let outcome = self
            .with_conn(move |conn| {
                // holder の検索と Collision 行の挿入は同じ書き込みトランザクションの中
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                match insert(&tx, &record) {
                    Ok(_) => {
                        tx.commit()?;
                        return Ok(PushOutcome::Queued(record));
                    }
                    Err(err) if record.collision_sign.is_some() && is_constraint_violation(&err) => {}
                    Err(err) => return Err(err.into()),
                }

                // 負けた側: Collision 行として残す
                let sign = record.collision_sign.clone().unwrap_or_default();
                let existing = in_flight_holder(&tx, &sign)?
                    .ok_or_else(|| StoreError::NotFound(format!("holder of sign {sign}")))?;
                record.status = TaskStatus::Collision;
                record.push_info(&format!("collision with {existing}"));
                insert(&tx, &record)?;
                tx.commit()?;
                Ok(PushOutcome::Collided {
                    task: record,
                    existing,
                })
            })
            .await?;

        match &outcome {
            PushOutcome::Queued(task) => {
                tracing::debug!(task_id = %task.id, handler = %task.handler, "task pushed")
            }
            PushOutcome::Collided { task, existing } => {
                tracing::debug!(task_id = %task.id, %existing, "push collided")
            }
        }
        Ok(outcome)
    }

    async fn claim_due(
        &self,
        topics: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        if topics.is_empty() {
            return Ok(None);
        }
        let placeholders = (0..topics.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE tasks
                SET status = 'process', attempt = attempt + 1, updated_at = ?1
              WHERE id = (
                    SELECT id FROM tasks
                     WHERE status = 'pending' AND start_at <= ?1 AND topic IN ({placeholders})
                     ORDER BY priority DESC, start_at ASC, id ASC
                     LIMIT 1)
                AND status = 'pending'
          RETURNING {COLUMNS}"
        );
        let mut values = Vec::with_capacity(topics.len() + 1);
        values.push(Value::Integer(now.timestamp_millis()));
        values.extend(topics.iter().cloned().map(Value::Text));

        let raw = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(&sql, rusqlite::params_from_iter(values), RawTask::from_row)
                    .optional()?)
            })
            .await?;
        raw.map(TaskRecord::try_from).transpose()
    }

    async fn complete(&self, report: TaskReport) -> Result<TaskRecord, StoreError> {
        self.finish(report, TaskRecord::mark_done).await
    }

    async fn fail(&self, report: TaskReport, error: String) -> Result<TaskRecord, StoreError> {
        self.finish(report, move |r| r.mark_error(error)).await
    }

    async fn reschedule(
        &self,
        report: TaskReport,
        next_start_at: DateTime<Utc>,
    ) -> Result<TaskRecord, StoreError> {
        let rearm = report.rearm;
        self.finish(report, move |r| r.reschedule(next_start_at, rearm))
            .await
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.with_conn(move |conn| load(conn, id)).await
    }

    async fn counts_by_status(&self) -> Result<TaskCounts, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut counts = TaskCounts::default();
            for row in rows {
                let (status, n) = row?;
                let status: TaskStatus = status.parse().map_err(StoreError::Decode)?;
                counts.add(status, n.max(0) as usize);
            }
            Ok(counts)
        })
        .await
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let now = self.clock.now().timestamp_millis();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks
                    SET status = 'pending',
                        updated_at = ?1,
                        info = info || CASE WHEN info = '' THEN '' ELSE char(10) END
                               || 'reaped: no outcome before stale cutoff'
                  WHERE status = 'process' AND updated_at < ?2",
                params![now, cutoff.timestamp_millis()],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn purge_finished(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks
                  WHERE status IN ('done', 'error', 'collision') AND updated_at < ?1",
                params![before.timestamp_millis()],
            )?;
            Ok(deleted)
        })
        .await
    }
}
