//! Static project files written after every generation task succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::TaskKind;

const SERVER_MAIN: &str = include_str!("templates/server_main.go.txt");
const GO_MOD: &str = include_str!("templates/go.mod.txt");
const README_TEMPLATE: &str = include_str!("templates/README.md.j2");

/// A scaffold step, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaffoldStep {
    ServerMain,
    ModuleDescriptor,
    Readme,
}

impl ScaffoldStep {
    pub const ALL: [ScaffoldStep; 3] = [
        ScaffoldStep::ServerMain,
        ScaffoldStep::ModuleDescriptor,
        ScaffoldStep::Readme,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScaffoldStep::ServerMain => "server main",
            ScaffoldStep::ModuleDescriptor => "go.mod",
            ScaffoldStep::Readme => "README",
        }
    }

    pub fn relative_path(self) -> PathBuf {
        match self {
            ScaffoldStep::ServerMain => ["cmd", "server", "main.go"].iter().collect(),
            ScaffoldStep::ModuleDescriptor => PathBuf::from("go.mod"),
            ScaffoldStep::Readme => PathBuf::from("README.md"),
        }
    }
}

/// Write one scaffold file under `root` and return its absolute path.
pub fn write_step(
    root: &Path,
    step: ScaffoldStep,
    description: &str,
    generated_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let contents = match step {
        ScaffoldStep::ServerMain => SERVER_MAIN.to_string(),
        ScaffoldStep::ModuleDescriptor => GO_MOD.to_string(),
        ScaffoldStep::Readme => render_readme(description, generated_at)?,
    };
    let path = root.join(step.relative_path());
    write_file(&path, &contents)?;
    debug!(step = step.name(), path = %path.display(), "scaffold written");
    Ok(path)
}

fn render_readme(description: &str, generated_at: DateTime<Utc>) -> Result<String> {
    let files: Vec<String> = TaskKind::ALL
        .iter()
        .map(|kind| kind.artifact_path().display().to_string())
        .collect();
    let env = Environment::new();
    let mut rendered = env
        .render_str(
            README_TEMPLATE,
            context! {
                description => description.trim(),
                files => files,
                generated_at => generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        )
        .context("render README template")?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write `contents` to `path`, creating parent directories as needed.
fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
