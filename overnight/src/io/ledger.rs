//! SQLite task ledger.
//!
//! The ledger is the durable record of every task a run attempted and every
//! artifact it wrote. It holds no pipeline logic: status transition discipline
//! belongs to the pipeline, the ledger only stores what it is told.
//!
//! All access goes through a single connection behind a mutex. The pipeline
//! is the only writer and never issues overlapping writes; the mutex keeps
//! that assumption enforced instead of incidental.
//!
//! Every mutating call is a synchronous round trip to the database file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::{GeneratedFile, PlannedTask, Task, TaskKind, TaskStatus};

const SCHEMA: &str = include_str!("schema.sql");

const TASK_COLUMNS: &str =
    "id, type, input, output, status, error, created_at, updated_at";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("task {0} already exists")]
    DuplicateIdentity(String),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("corrupt ledger row for {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Durable store of tasks and generated-file records.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the ledger at `path` and apply the schema.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!("ledger opened");
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory ledger.
    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> LedgerResult<Self> {
        // Foreign keys are off by default in SQLite.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock still guards a usable connection.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new task in `pending` status.
    #[instrument(skip_all, fields(task_id = %task.id, kind = %task.kind))]
    pub fn create_task(&self, task: &PlannedTask) -> LedgerResult<()> {
        let now = timestamp(Utc::now());
        let result = self.lock().execute(
            "INSERT INTO tasks (id, type, input, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                task.id,
                task.kind.as_str(),
                task.input,
                TaskStatus::Pending.as_str(),
                now
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => {
                Err(LedgerError::DuplicateIdentity(task.id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Update a task's status. Transitions are not validated here.
    pub fn set_status(&self, id: &str, status: TaskStatus) -> LedgerResult<()> {
        debug!(task_id = id, %status, "set task status");
        let changed = self.lock().execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), timestamp(Utc::now()), id],
        )?;
        ensure_changed(changed, id)
    }

    /// Store a task's sanitized output.
    pub fn set_output(&self, id: &str, output: &str) -> LedgerResult<()> {
        debug!(task_id = id, bytes = output.len(), "set task output");
        let changed = self.lock().execute(
            "UPDATE tasks SET output = ?1, updated_at = ?2 WHERE id = ?3",
            params![output, timestamp(Utc::now()), id],
        )?;
        ensure_changed(changed, id)
    }

    /// Record a failure message. Always forces the status to `failed`.
    pub fn set_error(&self, id: &str, message: &str) -> LedgerResult<()> {
        debug!(task_id = id, "set task error");
        let changed = self.lock().execute(
            "UPDATE tasks SET error = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                message,
                TaskStatus::Failed.as_str(),
                timestamp(Utc::now()),
                id
            ],
        )?;
        ensure_changed(changed, id)
    }

    pub fn get_task(&self, id: &str) -> LedgerResult<Task> {
        let row = self
            .lock()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        row.ok_or_else(|| LedgerError::NotFound(id.to_string()))?
            .into_task()
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> LedgerResult<Vec<Task>> {
        let rows = {
            let conn = self.lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([], TaskRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Append a generated-file record for an existing task.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub fn record_file(&self, task_id: &str, path: &str, content: &str) -> LedgerResult<()> {
        let conn = self.lock();
        let exists = conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id = ?1",
                params![task_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(LedgerError::NotFound(task_id.to_string()));
        }
        let result = conn.execute(
            "INSERT INTO files_generated (task_id, file_path, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id, path, content, timestamp(Utc::now())],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => {
                Err(LedgerError::NotFound(task_id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Generated-file records of one task, oldest first.
    pub fn list_files(&self, task_id: &str) -> LedgerResult<Vec<GeneratedFile>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, file_path, content, created_at
             FROM files_generated
             WHERE task_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, task_id, path, content, created_at)| -> LedgerResult<GeneratedFile> {
                Ok(GeneratedFile {
                    created_at: parse_timestamp(&task_id, &created_at)?,
                    id,
                    task_id,
                    path,
                    content,
                })
            })
            .collect()
    }

    /// Delete every file record and task in one transaction.
    #[instrument(skip_all)]
    pub fn purge_all(&self) -> LedgerResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        // Files first: they reference tasks.
        let files = tx.execute("DELETE FROM files_generated", [])?;
        let tasks = tx.execute("DELETE FROM tasks", [])?;
        tx.commit()?;
        debug!(files, tasks, "ledger purged");
        Ok(())
    }
}

/// Raw task columns, converted to [`Task`] outside the rusqlite callback.
struct TaskRow {
    id: String,
    kind: String,
    input: String,
    output: Option<String>,
    status: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            input: row.get(2)?,
            output: row.get(3)?,
            status: row.get(4)?,
            error: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_task(self) -> LedgerResult<Task> {
        let kind: TaskKind = self.kind.parse().map_err(|err| LedgerError::Corrupt {
            id: self.id.clone(),
            reason: format!("{err}"),
        })?;
        let status: TaskStatus = self.status.parse().map_err(|err| LedgerError::Corrupt {
            id: self.id.clone(),
            reason: format!("{err}"),
        })?;
        Ok(Task {
            created_at: parse_timestamp(&self.id, &self.created_at)?,
            updated_at: parse_timestamp(&self.id, &self.updated_at)?,
            id: self.id,
            kind,
            input: self.input,
            output: self.output,
            status,
            error: self.error,
        })
    }
}

/// Fixed-width RFC 3339 so lexical order matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(id: &str, raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| LedgerError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{raw}': {err}"),
        })
}

fn ensure_changed(changed: usize, id: &str) -> LedgerResult<()> {
    if changed == 0 {
        return Err(LedgerError::NotFound(id.to_string()));
    }
    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}
