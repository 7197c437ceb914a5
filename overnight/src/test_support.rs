//! Test-only fakes for the provider and prompt seams.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;

use crate::core::types::{Task, TaskKind, TaskStatus};
use crate::io::config::{Config, ValidationConfig};
use crate::io::prompt::PromptSource;
use crate::io::provider::CompletionProvider;
use crate::pipeline::RunSettings;

/// A fenced completion with trailing commentary, as models tend to answer.
pub const FENCED_DEMO: &str = "```go\npackage demo\n```\nThis file declares the demo package.";

/// Build a ledger-shaped task with fixed input and no output.
pub fn task_with_status(id: &str, kind: TaskKind, status: TaskStatus) -> Task {
    let now = Utc::now();
    Task {
        id: id.to_string(),
        kind,
        input: kind.default_input().to_string(),
        output: None,
        status,
        error: (status == TaskStatus::Failed).then(|| "boom".to_string()),
        created_at: now,
        updated_at: now,
    }
}

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Block until `timeout` elapses (or the duration, if shorter), then fail.
    Stall(Duration),
    /// Sleep for the full duration regardless of `timeout`, then answer.
    Slow(Duration, String),
}

/// Provider returning scripted replies in order, then a fallback reply.
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Answer every call with `text`.
    pub fn repeating(text: &str) -> Self {
        Self::new(Vec::new(), Reply::Text(text.to_string()))
    }

    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CompletionProvider for ScriptedProvider {
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());
        let reply = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(anyhow!(message)),
            Reply::Stall(duration) => {
                thread::sleep(duration.min(timeout));
                bail!("request timed out after {}ms", timeout.as_millis())
            }
            Reply::Slow(duration, text) => {
                thread::sleep(duration);
                Ok(text)
            }
        }
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Prompt source returning one template for every kind, optionally failing
/// for a single kind.
#[derive(Debug, Clone)]
pub struct StaticPromptSource {
    template: String,
    missing: Option<TaskKind>,
}

impl StaticPromptSource {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            missing: None,
        }
    }

    pub fn missing(mut self, kind: TaskKind) -> Self {
        self.missing = Some(kind);
        self
    }
}

impl PromptSource for StaticPromptSource {
    fn load(&self, kind: TaskKind) -> Result<String> {
        if self.missing == Some(kind) {
            bail!("no prompt for {kind}");
        }
        Ok(self.template.clone())
    }
}

/// `sh -c <script>` as a configured command.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Validation commands that always pass without a Go toolchain.
pub fn passing_validation() -> ValidationConfig {
    ValidationConfig {
        format: sh("true"),
        static_analysis: sh("true"),
        build_prepare: sh("true"),
        build: sh("true"),
        format_write: sh("true"),
        toolchain_probe: sh("echo go version go1.22.1"),
        test: sh("true"),
        file_check: sh("true"),
        coverage_profile: sh("true"),
        coverage_summary: sh("echo 'total: (statements) 0.0%'"),
        ..ValidationConfig::default()
    }
}

/// Settings for a run into `output_dir` with validation disabled.
pub fn quiet_settings(output_dir: &Path) -> RunSettings {
    let mut settings = RunSettings::from_config(&Config::default(), output_dir);
    settings.validation.enabled = false;
    settings
}
