//! Pipeline orchestrator: drives one generation run end to end.
//!
//! A run is strictly sequential: plan every task up front, execute each task
//! against the provider, write the static scaffold, run the validation chain
//! and persist a `status.json` snapshot. The first failing task halts the run
//! and nothing is retried. All ledger writes for a task happen in a fixed
//! order so a crashed run can be read back from the ledger alone.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::core::budget::{Deadline, DeadlineExceeded};
use crate::core::sanitize::sanitize;
use crate::core::summary::{GenerationStats, RunSummary};
use crate::core::types::{PlannedTask, Task, TaskStatus, plan_run};
use crate::error::{RunError, TaskError};
use crate::io::config::{Config, ValidationConfig};
use crate::io::ledger::{Ledger, LedgerResult};
use crate::io::prompt::{PromptSource, render_prompt};
use crate::io::provider::CompletionProvider;
use crate::io::scaffold::{ScaffoldStep, write_step};
use crate::io::snapshot::{RunSnapshot, ValidationOutcome, write_snapshot};
use crate::validate::Validator;

/// Run-time settings derived from [`Config`] plus the output directory.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub output_dir: PathBuf,
    pub max_runtime: Duration,
    pub max_output_bytes: usize,
    /// Per-request provider timeout, capped by the remaining run budget.
    pub provider_timeout: Duration,
    pub validation: ValidationConfig,
}

impl RunSettings {
    pub fn from_config(config: &Config, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_runtime: Duration::from_secs(config.max_runtime_secs),
            max_output_bytes: config.max_output_bytes,
            provider_timeout: Duration::from_secs(config.provider.request_timeout_secs),
            validation: config.validation.clone(),
        }
    }
}

/// Result of a run that reached the end of the pipeline.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub tasks: Vec<Task>,
    pub stats: GenerationStats,
    pub validation: ValidationOutcome,
    /// Set when the post-validation format step failed.
    pub format_error: Option<String>,
    /// Set when `status.json` could not be written.
    pub snapshot_error: Option<String>,
    pub elapsed: Duration,
}

/// Drives runs against one ledger, provider and prompt source.
pub struct Orchestrator<P, S> {
    provider: P,
    prompts: S,
    ledger: Ledger,
    settings: RunSettings,
    last_elapsed: Option<Duration>,
}

impl<P: CompletionProvider, S: PromptSource> Orchestrator<P, S> {
    pub fn new(provider: P, prompts: S, ledger: Ledger, settings: RunSettings) -> Self {
        Self {
            provider,
            prompts,
            ledger,
            settings,
            last_elapsed: None,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execute one full run for `description`, bounded by `max_runtime`.
    pub fn run(&mut self, description: &str) -> Result<RunReport, RunError> {
        let deadline = Deadline::starting_now(self.settings.max_runtime);
        self.run_within(description, deadline)
    }

    /// Execute one full run that also stops at the caller's deadline,
    /// whichever of it and `max_runtime` comes first.
    #[instrument(skip_all, fields(output_dir = %self.settings.output_dir.display()))]
    pub fn run_within(&mut self, description: &str, caller: Deadline) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let deadline = Deadline::starting_now(self.settings.max_runtime).earliest(caller);
        debug!(limit = ?deadline.limit(), "run deadline established");
        let result = self.run_inner(description, &deadline, started);
        self.last_elapsed = Some(started.elapsed());
        result
    }

    fn run_inner(
        &self,
        description: &str,
        deadline: &Deadline,
        started: Instant,
    ) -> Result<RunReport, RunError> {
        let output_dir = &self.settings.output_dir;
        fs::create_dir_all(output_dir).map_err(|err| RunError::Setup {
            path: output_dir.clone(),
            reason: err.to_string(),
        })?;

        let run_id = new_run_id(Utc::now());
        info!(%run_id, "starting run");

        let plan = plan_run(&run_id);
        for task in &plan {
            self.ledger
                .create_task(task)
                .map_err(|error| RunError::Plan {
                    id: task.id.clone(),
                    error,
                })?;
        }

        for task in &plan {
            if deadline.is_expired() {
                warn!(task = %task.id, "run deadline reached before task start");
                return Err(RunError::Timeout(DeadlineExceeded {
                    limit: deadline.limit(),
                }));
            }
            match self.execute_task(task, description, deadline) {
                Ok(()) => info!(task = %task.id, kind = %task.kind, "task complete"),
                Err(TaskError::Deadline(exceeded)) => {
                    warn!(task = %task.id, "run deadline reached during task");
                    return Err(RunError::Timeout(exceeded));
                }
                Err(err) => {
                    error!(task = %task.id, kind = %task.kind, err = %err, "task failed");
                    if let Err(ledger_err) = self.ledger.set_error(&task.id, &err.to_string()) {
                        error!(task = %task.id, err = %ledger_err, "failed to record task error");
                    }
                    return Err(RunError::Task {
                        id: task.id.clone(),
                        kind: task.kind,
                        error: err,
                    });
                }
            }
        }

        let generated_at = Utc::now();
        for step in ScaffoldStep::ALL {
            write_step(output_dir, step, description, generated_at).map_err(|err| {
                RunError::PostStep {
                    step: step.name(),
                    reason: format!("{err:#}"),
                }
            })?;
            info!(step = step.name(), "scaffold complete");
        }

        let (validation, format_error) = self.validate(deadline);

        let tasks = run_tasks(&self.ledger, &run_id)?;
        let mut files_generated = 0;
        for task in &tasks {
            files_generated += self.ledger.list_files(&task.id)?.len();
        }
        let elapsed = started.elapsed();
        let stats = GenerationStats::from_run(&tasks, files_generated, elapsed);

        let snapshot = RunSnapshot {
            run_id: &run_id,
            stats,
            tasks: &tasks,
            completed: stats.completed(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            duration: format!("{:.1}s", elapsed.as_secs_f64()),
            work_dir: output_dir,
            validation: &validation,
        };
        let snapshot_error = match write_snapshot(output_dir, &snapshot) {
            Ok(()) => None,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to write status snapshot");
                Some(format!("{err:#}"))
            }
        };

        info!(%run_id, elapsed_secs = elapsed.as_secs_f64(), "run finished");
        Ok(RunReport {
            run_id,
            tasks,
            stats,
            validation,
            format_error,
            snapshot_error,
            elapsed,
        })
    }

    /// Drive one task from pending to complete.
    #[instrument(skip_all, fields(task = %task.id, kind = %task.kind))]
    fn execute_task(
        &self,
        task: &PlannedTask,
        description: &str,
        deadline: &Deadline,
    ) -> Result<(), TaskError> {
        self.ledger.set_status(&task.id, TaskStatus::Running)?;

        let template = self.prompts.load(task.kind).map_err(TaskError::PromptLoad)?;
        let prompt =
            render_prompt(&template, description, &task.input).map_err(TaskError::PromptLoad)?;

        let timeout = deadline.cap(self.settings.provider_timeout).map_err(TaskError::Deadline)?;
        debug!(timeout_secs = timeout.as_secs_f64(), "calling provider");
        let raw = match self.provider.complete(&prompt, timeout) {
            Ok(raw) => raw,
            Err(_) if deadline.is_expired() => {
                return Err(TaskError::Deadline(DeadlineExceeded {
                    limit: deadline.limit(),
                }));
            }
            Err(err) => return Err(TaskError::Generation(err)),
        };

        let cleaned = sanitize(&raw);
        if cleaned.len() > self.settings.max_output_bytes {
            return Err(TaskError::OutputTooLarge {
                size: cleaned.len(),
                limit: self.settings.max_output_bytes,
            });
        }
        if let Some(first_line) = cleaned.lines().next() {
            debug!(preview = first_line, bytes = cleaned.len(), "sanitized output");
        }

        let relative = task.kind.artifact_path();
        write_artifact(&self.settings.output_dir, &relative, &cleaned)?;
        self.ledger
            .record_file(&task.id, &relative.to_string_lossy(), &cleaned)?;
        self.ledger.set_output(&task.id, &cleaned)?;
        self.ledger.set_status(&task.id, TaskStatus::Complete)?;
        Ok(())
    }

    /// Run the validation chain and the optional format step. Failures are
    /// logged only.
    fn validate(&self, deadline: &Deadline) -> (ValidationOutcome, Option<String>) {
        if !self.settings.validation.enabled {
            debug!("validation disabled");
            return (ValidationOutcome::Disabled, None);
        }
        let validator = Validator::new(&self.settings.output_dir, self.settings.validation.clone())
            .with_deadline(*deadline);
        if let Err(err) = validator.check_toolchain() {
            warn!(err = %err, "toolchain unavailable, skipping validation");
            return (
                ValidationOutcome::ToolchainMissing {
                    reason: err.to_string(),
                },
                None,
            );
        }

        let report = validator.validate_all();
        if !report.passed() {
            warn!("validation reported problems");
        }

        let format_error = if self.settings.validation.format_after {
            validator.format_in_place().err().map(|err| {
                warn!(err = %err, "format in place failed");
                err.to_string()
            })
        } else {
            None
        };
        (ValidationOutcome::Ran { report }, format_error)
    }

    /// Summarize every task in the ledger. Never mutates.
    pub fn summary(&self) -> LedgerResult<RunSummary> {
        ledger_summary(
            &self.ledger,
            self.last_elapsed,
            Some(self.settings.output_dir.clone()),
        )
    }
}

/// Summarize the ledger contents without a live orchestrator.
pub fn ledger_summary(
    ledger: &Ledger,
    elapsed: Option<Duration>,
    output_dir: Option<PathBuf>,
) -> LedgerResult<RunSummary> {
    let tasks = ledger.list_tasks()?;
    Ok(RunSummary::from_tasks(&tasks, elapsed, output_dir))
}

/// Run identifier with nanosecond resolution.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    now.format("run_%Y%m%d_%H%M%S_%9f").to_string()
}

fn run_tasks(ledger: &Ledger, run_id: &str) -> LedgerResult<Vec<Task>> {
    let prefix = format!("{run_id}_");
    Ok(ledger
        .list_tasks()?
        .into_iter()
        .filter(|task| task.id.starts_with(&prefix))
        .collect())
}

fn write_artifact(root: &Path, relative: &Path, contents: &str) -> Result<(), TaskError> {
    let path = root.join(relative);
    let write_error = |err: std::io::Error| TaskError::Write {
        path: path.clone(),
        reason: err.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(&path, contents).map_err(write_error)
}
