//! Prompt templates for generation tasks.
//!
//! A [`PromptSource`] supplies the raw template for a task kind; the pipeline
//! renders it with minijinja so templates can reference the run description
//! and the task's input text.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::TaskKind;

const MODELS_TEMPLATE: &str = include_str!("prompts/generate_models.txt");
const HANDLERS_TEMPLATE: &str = include_str!("prompts/generate_handlers.txt");
const REPOSITORY_TEMPLATE: &str = include_str!("prompts/generate_repository.txt");
const TESTS_TEMPLATE: &str = include_str!("prompts/generate_tests.txt");

/// Supplies the prompt template for a task kind.
pub trait PromptSource {
    fn load(&self, kind: TaskKind) -> Result<String>;
}

impl<T: PromptSource + ?Sized> PromptSource for Box<T> {
    fn load(&self, kind: TaskKind) -> Result<String> {
        (**self).load(kind)
    }
}

/// Templates compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPrompts;

impl PromptSource for BuiltinPrompts {
    fn load(&self, kind: TaskKind) -> Result<String> {
        let template = match kind {
            TaskKind::GenerateModels => MODELS_TEMPLATE,
            TaskKind::GenerateHandlers => HANDLERS_TEMPLATE,
            TaskKind::GenerateRepository => REPOSITORY_TEMPLATE,
            TaskKind::GenerateTests => TESTS_TEMPLATE,
        };
        Ok(template.to_string())
    }
}

/// Templates read from `<dir>/<kind>.txt` on every load.
#[derive(Debug, Clone)]
pub struct DirPrompts {
    dir: PathBuf,
}

impl DirPrompts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: TaskKind) -> PathBuf {
        self.dir.join(format!("{}.txt", kind.as_str()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PromptSource for DirPrompts {
    fn load(&self, kind: TaskKind) -> Result<String> {
        let path = self.path_for(kind);
        debug!(path = %path.display(), "loading prompt template");
        fs::read_to_string(&path).with_context(|| format!("read prompt file {}", path.display()))
    }
}

/// Render a prompt template with the run description and task input.
pub fn render_prompt(template: &str, description: &str, input: &str) -> Result<String> {
    let env = Environment::new();
    let rendered = env
        .render_str(
            template,
            context! {
                description => description.trim(),
                input => input.trim(),
            },
        )
        .context("render prompt template")?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_render_for_every_kind() {
        for kind in TaskKind::ALL {
            let template = BuiltinPrompts.load(kind).expect("load");
            let rendered =
                render_prompt(&template, "REST API for todo list", "Todo with CRUD").expect("render");
            assert!(rendered.contains("REST API for todo list"), "{kind}");
            assert!(!rendered.contains("{{"), "{kind}");
        }
    }

    #[test]
    fn dir_prompts_read_kind_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("generate_handlers.txt"),
            "Handlers for {{ description }} using {{ input }}",
        )
        .expect("write");

        let source = DirPrompts::new(temp.path());
        let template = source.load(TaskKind::GenerateHandlers).expect("load");
        let rendered = render_prompt(&template, " todo api ", "REST endpoints").expect("render");
        assert_eq!(rendered, "Handlers for todo api using REST endpoints");
    }

    #[test]
    fn dir_prompts_report_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = DirPrompts::new(temp.path())
            .load(TaskKind::GenerateTests)
            .unwrap_err();
        assert!(format!("{err:#}").contains("generate_tests.txt"));
    }

    #[test]
    fn plain_text_passes_through_rendering() {
        let rendered = render_prompt("test prompt", "anything", "ignored").expect("render");
        assert_eq!(rendered, "test prompt");
    }
}
