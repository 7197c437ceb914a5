//! Run configuration stored as TOML (default `overnight.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Every field is optional in the file; missing fields fall back to the
/// defaults below. CLI flags are applied on top by the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Global wall-clock budget for one run, in seconds.
    pub max_runtime_secs: u64,

    /// Largest sanitized output accepted for a single task.
    pub max_output_bytes: usize,

    /// Directory of `<kind>.txt` prompt templates. Built-in templates are
    /// used when unset.
    pub prompts_dir: Option<PathBuf>,

    pub provider: ProviderConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,

    /// Rewrite artifacts with the formatter after the chain runs.
    pub format_after: bool,

    pub check_timeout_secs: u64,

    /// Truncate captured check stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Formatter listing mode; the output directory is appended.
    pub format: Vec<String>,
    /// Run inside the output directory.
    pub static_analysis: Vec<String>,
    /// Best-effort step run before `build`; failures are ignored.
    pub build_prepare: Vec<String>,
    pub build: Vec<String>,
    /// Formatter rewrite mode; the output directory is appended.
    pub format_write: Vec<String>,
    pub toolchain_probe: Vec<String>,
    pub test: Vec<String>,
    /// Single-file syntax check; the file path is appended.
    pub file_check: Vec<String>,
    /// Writes a coverage profile into the output directory.
    pub coverage_profile: Vec<String>,
    /// Prints the per-function summary of that profile.
    pub coverage_summary: Vec<String>,
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "codellama:7b".to_string(),
            temperature: 0.2,
            top_p: 0.9,
            num_predict: 4096,
            request_timeout_secs: 300,
            health_timeout_secs: 10,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format_after: true,
            check_timeout_secs: 30,
            output_limit_bytes: 100_000,
            format: strings(&["gofmt", "-l"]),
            static_analysis: strings(&["go", "vet", "./..."]),
            build_prepare: strings(&["go", "mod", "download"]),
            build: strings(&["go", "build", "./..."]),
            format_write: strings(&["gofmt", "-w"]),
            toolchain_probe: strings(&["go", "version"]),
            test: strings(&["go", "test", "-v", "-cover", "./..."]),
            file_check: strings(&["gofmt", "-e"]),
            coverage_profile: strings(&["go", "test", "-coverprofile=coverage.out", "./..."]),
            coverage_summary: strings(&["go", "tool", "cover", "-func=coverage.out"]),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_runtime_secs: 30 * 60,
            max_output_bytes: 10 * 1024 * 1024,
            prompts_dir: None,
            provider: ProviderConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_runtime_secs == 0 {
            return Err(anyhow!("max_runtime_secs must be > 0"));
        }
        if self.max_output_bytes == 0 {
            return Err(anyhow!("max_output_bytes must be > 0"));
        }
        if self.provider.endpoint.trim().is_empty() {
            return Err(anyhow!("provider.endpoint must not be empty"));
        }
        if self.provider.model.trim().is_empty() {
            return Err(anyhow!("provider.model must not be empty"));
        }
        if self.provider.request_timeout_secs == 0 || self.provider.health_timeout_secs == 0 {
            return Err(anyhow!("provider timeouts must be > 0"));
        }
        self.validation.validate()
    }
}

impl ValidationConfig {
    fn validate(&self) -> Result<()> {
        if self.check_timeout_secs == 0 {
            return Err(anyhow!("validation.check_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("validation.output_limit_bytes must be > 0"));
        }
        let commands = [
            ("format", &self.format),
            ("static_analysis", &self.static_analysis),
            ("build_prepare", &self.build_prepare),
            ("build", &self.build),
            ("format_write", &self.format_write),
            ("toolchain_probe", &self.toolchain_probe),
            ("test", &self.test),
            ("file_check", &self.file_check),
            ("coverage_profile", &self.coverage_profile),
            ("coverage_summary", &self.coverage_summary),
        ];
        for (name, command) in commands {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(anyhow!("validation.{name} must be a non-empty array"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
