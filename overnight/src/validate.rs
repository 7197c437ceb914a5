//! Validation chain over the generated project.
//!
//! The chain runs a fixed sequence of external checks (format, static
//! analysis, build) against the output directory. Every check runs no matter
//! how earlier checks ended, and each produces exactly one
//! [`ValidationResult`]. Validation never aborts a run; the pipeline folds the
//! report into its snapshot and the binary prints it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::budget::{Deadline, DeadlineExceeded};
use crate::io::config::ValidationConfig;
use crate::io::process::{CommandOutput, is_missing_program, run_command_with_timeout};

/// Why a check did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },
    #[error("{tool} reported problems (exit code {code:?})")]
    Failed { tool: String, code: Option<i32> },
    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },
    #[error("{tool} could not run: {reason}")]
    Io { tool: String, reason: String },
    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub tool: String,
    pub success: bool,
    /// The tool could not be found; the check was not run.
    pub skipped: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ValidationResult {
    fn passed(tool: &str, output: String) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            skipped: false,
            output,
            error: None,
        }
    }

    fn failed(tool: &str, output: String, err: &CheckError) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            skipped: matches!(err, CheckError::ToolUnavailable { .. }),
            output,
            error: Some(err.to_string()),
        }
    }

    fn verdict(&self) -> &'static str {
        if self.success {
            "PASS"
        } else if self.skipped {
            "SKIP"
        } else {
            "FAIL"
        }
    }
}

/// Ordered results of one chain execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    /// True iff every check passed.
    pub fn passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|result| result.success)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "VALIDATION RESULTS")?;
        writeln!(f, "{rule}")?;
        for result in &self.results {
            writeln!(f)?;
            writeln!(f, "{} - {}", result.tool, result.verdict())?;
            let output = result.output.trim();
            if !output.is_empty() {
                writeln!(f, "Output:")?;
                for line in output.lines() {
                    writeln!(f, "  {line}")?;
                }
            }
            if let Some(error) = &result.error {
                writeln!(f, "Error: {error}")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "{rule}")?;
        if self.passed() {
            writeln!(f, "All validation checks passed!")
        } else {
            writeln!(f, "WARNING: Some validation checks failed. Review the output above.")
        }
    }
}

const FORMAT_TOOL: &str = "gofmt";
const VET_TOOL: &str = "go vet";
const BUILD_TOOL: &str = "go build";
const TEST_TOOL: &str = "go test";
const FILE_TOOL: &str = "gofmt (single file)";
const COVERAGE_TOOL: &str = "go coverage";

/// Runs the configured checks against one output directory.
#[derive(Debug, Clone)]
pub struct Validator {
    work_dir: PathBuf,
    config: ValidationConfig,
    deadline: Option<Deadline>,
}

impl Validator {
    pub fn new(work_dir: impl Into<PathBuf>, config: ValidationConfig) -> Self {
        Self {
            work_dir: work_dir.into(),
            config,
            deadline: None,
        }
    }

    /// Cap every check timeout by the remaining run budget.
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run format, static analysis and build checks, in that order.
    #[instrument(skip_all, fields(work_dir = %self.work_dir.display()))]
    pub fn validate_all(&self) -> ValidationReport {
        let results = vec![
            self.check_format(),
            self.run_static_analysis(),
            self.try_build(),
        ];
        let passed = results.iter().filter(|result| result.success).count();
        info!(passed, total = results.len(), "validation finished");
        ValidationReport { results }
    }

    fn check_format(&self) -> ValidationResult {
        let out = match self.run(FORMAT_TOOL, &self.config.format, Some(Path::new("."))) {
            Ok(out) => out,
            Err(err) => return self.unavailable_or_failed(FORMAT_TOOL, err),
        };
        let listed = out.stdout_text();
        if let Some(err) = exit_error(FORMAT_TOOL, &out, self.check_timeout()) {
            return ValidationResult::failed(FORMAT_TOOL, out.diagnostic_text(), &err);
        }
        if !listed.trim().is_empty() {
            let err = CheckError::Failed {
                tool: FORMAT_TOOL.to_string(),
                code: out.status.code(),
            };
            return ValidationResult::failed(
                FORMAT_TOOL,
                format!("Files need formatting:\n{listed}"),
                &err,
            );
        }
        ValidationResult::passed(FORMAT_TOOL, listed)
    }

    fn run_static_analysis(&self) -> ValidationResult {
        self.exit_code_check(VET_TOOL, &self.config.static_analysis)
    }

    fn try_build(&self) -> ValidationResult {
        // Dependency download is best-effort; the build reports what is missing.
        match self.run(BUILD_TOOL, &self.config.build_prepare, None) {
            Ok(out) if !out.success() => {
                warn!(output = %out.diagnostic_text().trim(), "build preparation failed");
            }
            Err(err) => warn!(err = %err, "build preparation did not run"),
            Ok(_) => {}
        }
        self.exit_code_check(BUILD_TOOL, &self.config.build)
    }

    fn exit_code_check(&self, tool: &str, argv: &[String]) -> ValidationResult {
        match self.run(tool, argv, None) {
            Ok(out) => match exit_error(tool, &out, self.check_timeout()) {
                Some(err) => ValidationResult::failed(tool, out.diagnostic_text(), &err),
                None => ValidationResult::passed(tool, out.diagnostic_text()),
            },
            Err(err) => self.unavailable_or_failed(tool, err),
        }
    }

    /// Rewrite the generated sources with the formatter.
    #[instrument(skip_all)]
    pub fn format_in_place(&self) -> Result<(), CheckError> {
        let out = self.run(FORMAT_TOOL, &self.config.format_write, Some(Path::new(".")))?;
        match exit_error(FORMAT_TOOL, &out, self.check_timeout()) {
            Some(err) => {
                warn!(stderr = %out.stderr_text().trim(), "format in place failed");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Run the generated project's test suite. Not part of the fixed chain.
    pub fn run_tests(&self) -> ValidationResult {
        let out = match self.run(TEST_TOOL, &self.config.test, None) {
            Ok(out) => out,
            Err(err) => return self.unavailable_or_failed(TEST_TOOL, err),
        };
        let mut output = out.stdout_text();
        let stderr = out.stderr_text();
        if !stderr.is_empty() {
            output.push('\n');
            output.push_str(&stderr);
        }
        match exit_error(TEST_TOOL, &out, self.check_timeout()) {
            Some(err) => ValidationResult::failed(TEST_TOOL, output, &err),
            None => ValidationResult::passed(TEST_TOOL, output),
        }
    }

    /// Syntax-check one file. Relative paths resolve against the output
    /// directory.
    pub fn validate_file(&self, path: &Path) -> ValidationResult {
        let out = match self.run(FILE_TOOL, &self.config.file_check, Some(path)) {
            Ok(out) => out,
            Err(err) => return self.unavailable_or_failed(FILE_TOOL, err),
        };
        let stderr = out.stderr_text();
        if let Some(err) = exit_error(FILE_TOOL, &out, self.check_timeout()) {
            return ValidationResult::failed(FILE_TOOL, out.diagnostic_text(), &err);
        }
        if !stderr.trim().is_empty() {
            let err = CheckError::Failed {
                tool: FILE_TOOL.to_string(),
                code: out.status.code(),
            };
            return ValidationResult::failed(FILE_TOOL, stderr, &err);
        }
        ValidationResult::passed(FILE_TOOL, out.stdout_text())
    }

    /// Write a coverage profile, then report per-function coverage. Gets
    /// twice the check timeout. Not part of the fixed chain.
    pub fn coverage_report(&self) -> ValidationResult {
        let timeout = self.check_timeout() * 2;
        let profile = match self.run_for(COVERAGE_TOOL, &self.config.coverage_profile, None, timeout) {
            Ok(out) => out,
            Err(err) => return self.unavailable_or_failed(COVERAGE_TOOL, err),
        };
        if let Some(err) = exit_error(COVERAGE_TOOL, &profile, timeout) {
            return ValidationResult::failed(COVERAGE_TOOL, profile.diagnostic_text(), &err);
        }

        let summary = match self.run_for(COVERAGE_TOOL, &self.config.coverage_summary, None, timeout) {
            Ok(out) => out,
            Err(err) => return self.unavailable_or_failed(COVERAGE_TOOL, err),
        };
        match exit_error(COVERAGE_TOOL, &summary, timeout) {
            Some(err) => ValidationResult::failed(COVERAGE_TOOL, summary.diagnostic_text(), &err),
            None => ValidationResult::passed(COVERAGE_TOOL, summary.stdout_text()),
        }
    }

    /// Confirm the toolchain is installed; returns its version line.
    pub fn check_toolchain(&self) -> Result<String, CheckError> {
        let tool = self
            .config
            .toolchain_probe
            .first()
            .cloned()
            .unwrap_or_default();
        let out = self.run(&tool, &self.config.toolchain_probe, None)?;
        if let Some(err) = exit_error(&tool, &out, self.check_timeout()) {
            return Err(err);
        }
        Ok(out.stdout_text().trim().to_string())
    }

    fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.config.check_timeout_secs)
    }

    fn run(&self, tool: &str, argv: &[String], target: Option<&Path>) -> Result<CommandOutput, CheckError> {
        self.run_for(tool, argv, target, self.check_timeout())
    }

    fn run_for(
        &self,
        tool: &str,
        argv: &[String],
        target: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, CheckError> {
        let timeout = match &self.deadline {
            Some(deadline) => deadline.cap(timeout)?,
            None => timeout,
        };
        let Some((program, args)) = argv.split_first() else {
            return Err(CheckError::Io {
                tool: tool.to_string(),
                reason: "empty command".to_string(),
            });
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.work_dir);
        if let Some(target) = target {
            cmd.arg(target);
        }
        run_command_with_timeout(cmd, timeout, self.config.output_limit_bytes).map_err(|err| {
            if is_missing_program(&err) {
                CheckError::ToolUnavailable {
                    tool: tool.to_string(),
                    reason: format!("{err:#}"),
                }
            } else {
                CheckError::Io {
                    tool: tool.to_string(),
                    reason: format!("{err:#}"),
                }
            }
        })
    }

    fn unavailable_or_failed(&self, tool: &str, err: CheckError) -> ValidationResult {
        if matches!(err, CheckError::ToolUnavailable { .. }) {
            warn!(tool, err = %err, "validation tool unavailable, skipping");
        } else {
            warn!(tool, err = %err, "validation check could not run");
        }
        ValidationResult::failed(tool, String::new(), &err)
    }
}

fn exit_error(tool: &str, out: &CommandOutput, timeout: Duration) -> Option<CheckError> {
    if out.timed_out {
        return Some(CheckError::TimedOut {
            tool: tool.to_string(),
            timeout,
        });
    }
    (!out.status.success()).then(|| CheckError::Failed {
        tool: tool.to_string(),
        code: out.status.code(),
    })
}
