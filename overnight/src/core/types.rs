//! Shared task types for the generation pipeline.
//!
//! These types define the stable contract between the ledger, the pipeline and
//! the run snapshot. Their serialized names are persisted in SQLite and in
//! `status.json`, so renaming a variant is a format change.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of generation work; selects the prompt and the artifact path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateModels,
    GenerateHandlers,
    GenerateRepository,
    GenerateTests,
}

impl TaskKind {
    /// Every kind, in pipeline order.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::GenerateModels,
        TaskKind::GenerateHandlers,
        TaskKind::GenerateRepository,
        TaskKind::GenerateTests,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::GenerateModels => "generate_models",
            TaskKind::GenerateHandlers => "generate_handlers",
            TaskKind::GenerateRepository => "generate_repository",
            TaskKind::GenerateTests => "generate_tests",
        }
    }

    /// Artifact path relative to the output root.
    pub fn artifact_path(self) -> PathBuf {
        match self {
            TaskKind::GenerateModels => ["internal", "models", "todo.go"].iter().collect(),
            TaskKind::GenerateHandlers => ["internal", "handlers", "todo_handler.go"]
                .iter()
                .collect(),
            TaskKind::GenerateRepository => ["internal", "repository", "todo_repo.go"]
                .iter()
                .collect(),
            TaskKind::GenerateTests => ["tests", "todo_handler_test.go"].iter().collect(),
        }
    }

    /// Instruction text stored as the task's input.
    pub fn default_input(self) -> &'static str {
        match self {
            TaskKind::GenerateModels => "Todo with CRUD",
            TaskKind::GenerateHandlers => "REST endpoints",
            TaskKind::GenerateRepository => "SQLite storage",
            TaskKind::GenerateTests => "Unit tests",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned while parsing persisted kind or status names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {field}: {value}")]
pub struct ParseNameError {
    pub field: &'static str,
    pub value: String,
}

impl FromStr for TaskKind {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseNameError {
                field: "task kind",
                value: s.to_string(),
            })
    }
}

/// Lifecycle of a task. Transitions only move forward:
/// `pending -> running -> {complete | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "complete" => Ok(TaskStatus::Complete),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ParseNameError {
                field: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// A task as planned for a run, before it is written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub id: String,
    pub kind: TaskKind,
    pub input: String,
}

/// A task row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub input: String,
    pub output: Option<String>,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One artifact write recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub id: i64,
    pub task_id: String,
    pub path: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Build the task id for ordinal `ordinal` (1-indexed) of `run_id`.
pub fn task_id(run_id: &str, ordinal: usize) -> String {
    format!("{run_id}_task_{ordinal:03}")
}

/// The fixed, ordered task list for one run.
pub fn plan_run(run_id: &str) -> Vec<PlannedTask> {
    TaskKind::ALL
        .iter()
        .enumerate()
        .map(|(index, kind)| PlannedTask {
            id: task_id(run_id, index + 1),
            kind: *kind,
            input: kind.default_input().to_string(),
        })
        .collect()
}
