//! `status.json` run snapshot.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::summary::GenerationStats;
use crate::core::types::Task;
use crate::validate::ValidationReport;

pub const SNAPSHOT_FILE: &str = "status.json";

/// How validation ended for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Disabled,
    /// The toolchain probe failed, so no check ran.
    ToolchainMissing { reason: String },
    Ran { report: ValidationReport },
}

impl ValidationOutcome {
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            ValidationOutcome::Ran { report } => Some(report),
            _ => None,
        }
    }
}

/// Snapshot written at the end of a successful run.
#[derive(Debug, Serialize)]
pub struct RunSnapshot<'a> {
    pub run_id: &'a str,
    pub stats: GenerationStats,
    pub tasks: &'a [Task],
    pub completed: bool,
    pub timestamp: String,
    pub duration: String,
    pub work_dir: &'a Path,
    pub validation: &'a ValidationOutcome,
}

/// Write the snapshot as pretty JSON (temp file + rename).
pub fn write_snapshot(dir: &Path, snapshot: &RunSnapshot<'_>) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(snapshot).context("serialize snapshot")?;
    payload.push('\n');
    let path = dir.join(SNAPSHOT_FILE);
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)
        .with_context(|| format!("write temp snapshot {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("replace snapshot {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::types::{TaskKind, TaskStatus};
    use crate::test_support::task_with_status;

    #[test]
    fn snapshot_contains_stats_and_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tasks = vec![task_with_status(
            "run_a_task_001",
            TaskKind::GenerateModels,
            TaskStatus::Complete,
        )];
        let stats = GenerationStats::from_run(&tasks, 1, Duration::from_secs(2));
        let validation = ValidationOutcome::ToolchainMissing {
            reason: "go not found".to_string(),
        };
        let snapshot = RunSnapshot {
            run_id: "run_a",
            stats,
            tasks: &tasks,
            completed: stats.completed(),
            timestamp: "2024-05-01T00:00:00Z".to_string(),
            duration: "2.0s".to_string(),
            work_dir: temp.path(),
            validation: &validation,
        };
        write_snapshot(temp.path(), &snapshot).expect("write");

        let raw = fs::read_to_string(temp.path().join(SNAPSHOT_FILE)).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["completed"], true);
        assert_eq!(value["stats"]["completed_tasks"], 1);
        assert_eq!(value["tasks"][0]["kind"], "generate_models");
        assert_eq!(value["validation"]["state"], "toolchain_missing");
        assert!(!temp.path().join("status.json.tmp").exists());
    }
}
