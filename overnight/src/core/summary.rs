//! Run summaries reconstructed from ledger rows.
//!
//! Summaries never consult in-memory run state. A failed or crashed run is
//! described purely by what the ledger holds.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::types::{Task, TaskKind, TaskStatus};

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..TaskCounts::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Complete => counts.complete += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// True only when every task completed and none failed.
    pub fn all_complete(&self) -> bool {
        self.total > 0 && self.complete == self.total && self.failed == 0
    }
}

/// Statistics for one run, persisted in `status.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub total_duration_secs: f64,
    pub files_generated: usize,
    pub total_output_bytes: usize,
}

impl GenerationStats {
    /// `files_generated` counts ledger file records for the run's tasks.
    pub fn from_run(tasks: &[Task], files_generated: usize, elapsed: Duration) -> Self {
        let counts = TaskCounts::from_tasks(tasks);
        Self {
            total_tasks: counts.total,
            completed_tasks: counts.complete,
            failed_tasks: counts.failed,
            total_duration_secs: elapsed.as_secs_f64(),
            files_generated,
            total_output_bytes: tasks
                .iter()
                .filter_map(|task| task.output.as_deref())
                .map(str::len)
                .sum(),
        }
    }

    pub fn completed(&self) -> bool {
        self.total_tasks > 0 && self.completed_tasks == self.total_tasks
    }
}

/// One line of the summary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
}

/// Human-facing summary of the ledger contents.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub lines: Vec<SummaryLine>,
    pub counts: TaskCounts,
    pub elapsed: Option<Duration>,
    pub output_dir: Option<PathBuf>,
}

impl RunSummary {
    pub fn from_tasks(tasks: &[Task], elapsed: Option<Duration>, output_dir: Option<PathBuf>) -> Self {
        Self {
            lines: tasks
                .iter()
                .map(|task| SummaryLine {
                    id: task.id.clone(),
                    kind: task.kind,
                    status: task.status,
                })
                .collect(),
            counts: TaskCounts::from_tasks(tasks),
            elapsed,
            output_dir,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.counts.all_complete()
    }
}

fn status_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Complete => "[DONE]",
        TaskStatus::Failed => "[FAIL]",
        TaskStatus::Running => "[RUN ]",
        TaskStatus::Pending => "[WAIT]",
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "GENERATION SUMMARY")?;
        writeln!(f, "{rule}")?;
        for line in &self.lines {
            writeln!(
                f,
                "{} {} - {} ({})",
                status_marker(line.status),
                line.kind,
                line.status,
                line.id
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Total Tasks: {}", self.counts.total)?;
        writeln!(f, "Completed:   {}", self.counts.complete)?;
        writeln!(f, "Failed:      {}", self.counts.failed)?;
        if let Some(elapsed) = self.elapsed {
            writeln!(f, "Duration:    {:.1}s", elapsed.as_secs_f64())?;
        }
        if let Some(dir) = &self.output_dir {
            writeln!(f, "Output Dir:  {}", dir.display())?;
        }
        if self.succeeded() {
            writeln!(f)?;
            writeln!(f, "All tasks completed successfully!")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task_with_status;

    #[test]
    fn counts_each_status() {
        let tasks = vec![
            task_with_status("r_task_001", TaskKind::GenerateModels, TaskStatus::Complete),
            task_with_status("r_task_002", TaskKind::GenerateHandlers, TaskStatus::Failed),
            task_with_status("r_task_003", TaskKind::GenerateRepository, TaskStatus::Pending),
            task_with_status("r_task_004", TaskKind::GenerateTests, TaskStatus::Running),
        ];
        let counts = TaskCounts::from_tasks(&tasks);
        assert_eq!(
            counts,
            TaskCounts {
                total: 4,
                pending: 1,
                running: 1,
                complete: 1,
                failed: 1,
            }
        );
        assert!(!counts.all_complete());
    }

    #[test]
    fn stats_sum_output_bytes() {
        let mut done = task_with_status("r_task_001", TaskKind::GenerateModels, TaskStatus::Complete);
        done.output = Some("package demo".to_string());
        let pending = task_with_status("r_task_002", TaskKind::GenerateHandlers, TaskStatus::Pending);

        let stats = GenerationStats::from_run(&[done, pending], 1, Duration::from_millis(1500));
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.total_output_bytes, 12);
        assert_eq!(stats.files_generated, 1);
        assert!((stats.total_duration_secs - 1.5).abs() < f64::EPSILON);
        assert!(!stats.completed());
    }

    #[test]
    fn empty_ledger_is_not_success() {
        let summary = RunSummary::from_tasks(&[], None, None);
        assert!(!summary.succeeded());
        assert!(!summary.to_string().contains("completed successfully"));
    }

    #[test]
    fn failed_task_never_reports_success() {
        let tasks = vec![
            task_with_status("r_task_001", TaskKind::GenerateModels, TaskStatus::Complete),
            task_with_status("r_task_002", TaskKind::GenerateHandlers, TaskStatus::Failed),
        ];
        let rendered = RunSummary::from_tasks(&tasks, Some(Duration::from_secs(3)), None).to_string();
        assert!(rendered.contains("[FAIL] generate_handlers - failed"));
        assert!(rendered.contains("Completed:   1"));
        assert!(rendered.contains("Failed:      1"));
        assert!(!rendered.contains("completed successfully"));
    }
}
