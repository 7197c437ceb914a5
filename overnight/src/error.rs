//! Error types surfaced by the pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::budget::DeadlineExceeded;
use crate::core::types::TaskKind;
use crate::io::ledger::LedgerError;

/// Why a single task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to load prompt: {0:#}")]
    PromptLoad(anyhow::Error),
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("output exceeds size limit: {size} > {limit}")]
    OutputTooLarge { size: usize, limit: usize },
    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
    #[error("ledger update failed: {0}")]
    Ledger(LedgerError),
    /// The run budget ran out while the task was in flight.
    #[error(transparent)]
    Deadline(DeadlineExceeded),
}

impl From<LedgerError> for TaskError {
    fn from(err: LedgerError) -> Self {
        TaskError::Ledger(err)
    }
}

/// Why a run stopped before completing.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to prepare output directory {}: {reason}", path.display())]
    Setup { path: PathBuf, reason: String },
    #[error("failed to create task {id}: {error}")]
    Plan { id: String, error: LedgerError },
    #[error("generation timeout exceeded: {0}")]
    Timeout(DeadlineExceeded),
    #[error("task {id} ({kind}) failed: {error}")]
    Task {
        id: String,
        kind: TaskKind,
        error: TaskError,
    },
    #[error("failed to generate {step}: {reason}")]
    PostStep { step: &'static str, reason: String },
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl RunError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunError::Timeout(_))
    }
}

impl From<LedgerError> for RunError {
    fn from(err: LedgerError) -> Self {
        RunError::Ledger(err)
    }
}
