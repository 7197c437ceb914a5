//! End-to-end runs of the orchestrator against scripted providers.
//!
//! Each test drives a full run into a temp directory with an on-disk ledger
//! and inspects the ledger, the artifacts and `status.json` afterwards.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use overnight::core::budget::Deadline;
use overnight::core::types::{TaskKind, TaskStatus};
use overnight::error::{RunError, TaskError};
use overnight::io::ledger::Ledger;
use overnight::io::snapshot::{SNAPSHOT_FILE, ValidationOutcome};
use overnight::pipeline::Orchestrator;
use overnight::test_support::{
    FENCED_DEMO, Reply, ScriptedProvider, StaticPromptSource, passing_validation, quiet_settings,
    sh,
};

const TEMPLATE: &str = "Write {{ input }} for {{ description }}";

fn open_ledger(root: &Path) -> Ledger {
    Ledger::open(&root.join("state/ledger.db")).expect("ledger")
}

#[test]
fn four_task_run_writes_sanitized_artifacts_and_snapshot() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("generated");
    let mut settings = quiet_settings(&out);
    settings.validation = passing_validation();

    let mut orchestrator = Orchestrator::new(
        ScriptedProvider::repeating(FENCED_DEMO),
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );
    let report = orchestrator.run("todo service").expect("run");

    for kind in TaskKind::ALL {
        let written = fs::read_to_string(out.join(kind.artifact_path())).expect("artifact");
        assert_eq!(written, "package demo", "{kind}");
    }
    for scaffold in ["cmd/server/main.go", "go.mod", "README.md"] {
        assert!(out.join(scaffold).is_file(), "{scaffold}");
    }

    assert_eq!(report.stats.total_tasks, 4);
    assert_eq!(report.stats.completed_tasks, 4);
    assert_eq!(report.stats.failed_tasks, 0);
    assert_eq!(report.stats.files_generated, 4);
    assert_eq!(report.stats.total_output_bytes, 4 * "package demo".len());
    let validation = report.validation.report().expect("validation ran");
    assert!(validation.passed());
    assert!(report.format_error.is_none());

    let raw = fs::read_to_string(out.join(SNAPSHOT_FILE)).expect("snapshot");
    let snapshot: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(snapshot["completed"], true);
    assert_eq!(snapshot["stats"]["completed_tasks"], 4);
    assert_eq!(snapshot["stats"]["failed_tasks"], 0);
    assert_eq!(snapshot["run_id"], report.run_id.as_str());
    assert_eq!(snapshot["validation"]["state"], "ran");
    assert_eq!(snapshot["tasks"].as_array().map(Vec::len), Some(4));

    let ledger = orchestrator.ledger();
    for task in &report.tasks {
        let files = ledger.list_files(&task.id).expect("files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, task.kind.artifact_path().to_string_lossy());
        assert_eq!(task.output.as_deref(), Some("package demo"));
    }

    let summary = orchestrator.summary().expect("summary");
    assert!(summary.succeeded());
    assert!(summary.to_string().contains("All tasks completed successfully!"));
}

#[test]
fn prompts_are_rendered_with_description_and_input() {
    let temp = tempfile::tempdir().expect("tempdir");
    let provider = ScriptedProvider::repeating("package demo");
    let mut orchestrator = Orchestrator::new(
        provider,
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        quiet_settings(&temp.path().join("out")),
    );
    orchestrator.run("todo service").expect("run");

    assert_eq!(
        orchestrator.provider().prompts(),
        [
            "Write Todo with CRUD for todo service",
            "Write REST endpoints for todo service",
            "Write SQLite storage for todo service",
            "Write Unit tests for todo service",
        ]
    );
}

#[test]
fn second_task_failure_halts_run_and_is_recorded() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("out");
    let provider = ScriptedProvider::new(
        vec![
            Reply::Text(FENCED_DEMO.to_string()),
            Reply::Fail("connection refused".to_string()),
        ],
        Reply::Text("package never".to_string()),
    );
    let mut orchestrator = Orchestrator::new(
        provider,
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        quiet_settings(&out),
    );

    let err = orchestrator.run("todo service").unwrap_err();
    let RunError::Task { id, kind, error } = &err else {
        panic!("expected task error, got {err}");
    };
    assert!(id.ends_with("_task_002"));
    assert_eq!(*kind, TaskKind::GenerateHandlers);
    assert!(matches!(error, TaskError::Generation(_)));
    assert!(err.to_string().contains(id.as_str()));
    assert!(err.to_string().contains("generate_handlers"));

    let tasks = orchestrator.ledger().list_tasks().expect("tasks");
    let statuses: Vec<TaskStatus> = tasks.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        [
            TaskStatus::Complete,
            TaskStatus::Failed,
            TaskStatus::Pending,
            TaskStatus::Pending,
        ]
    );
    assert_eq!(tasks[0].output.as_deref(), Some("package demo"));
    assert!(tasks[1].output.is_none());
    assert!(
        tasks[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("connection refused"))
    );
    assert!(tasks[2].error.is_none());

    assert!(!out.join("go.mod").exists());
    assert!(!out.join(SNAPSHOT_FILE).exists());

    let summary = orchestrator.summary().expect("summary");
    assert_eq!(summary.counts.complete, 1);
    assert_eq!(summary.counts.failed, 1);
    assert!(!summary.succeeded());
    assert!(!summary.to_string().contains("completed successfully"));
}

#[test]
fn deadline_during_call_leaves_task_running() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut settings = quiet_settings(&temp.path().join("out"));
    settings.max_runtime = Duration::from_millis(300);
    let provider = ScriptedProvider::new(
        vec![
            Reply::Text("package demo".to_string()),
            Reply::Stall(Duration::from_secs(5)),
        ],
        Reply::Text("package late".to_string()),
    );
    let mut orchestrator = Orchestrator::new(
        provider,
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );

    let err = orchestrator.run("todo service").unwrap_err();
    assert!(err.is_timeout(), "{err}");

    let tasks = orchestrator.ledger().list_tasks().expect("tasks");
    assert_eq!(tasks[0].status, TaskStatus::Complete);
    assert_eq!(tasks[1].status, TaskStatus::Running);
    assert!(tasks[1].error.is_none());
    assert_eq!(tasks[2].status, TaskStatus::Pending);
    assert_eq!(tasks[3].status, TaskStatus::Pending);
}

#[test]
fn deadline_between_tasks_stops_before_next_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut settings = quiet_settings(&temp.path().join("out"));
    settings.max_runtime = Duration::from_millis(200);
    let provider = ScriptedProvider::new(
        vec![Reply::Slow(
            Duration::from_millis(400),
            "package demo".to_string(),
        )],
        Reply::Text("package never".to_string()),
    );
    let mut orchestrator = Orchestrator::new(
        provider,
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );

    let err = orchestrator.run("todo service").unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert_eq!(orchestrator.provider().prompts().len(), 1);

    let tasks = orchestrator.ledger().list_tasks().expect("tasks");
    assert_eq!(tasks[0].status, TaskStatus::Complete);
    assert_eq!(tasks[1].status, TaskStatus::Pending);
    assert!(tasks[1].error.is_none());
    assert!(tasks[1].output.is_none());
}

#[test]
fn caller_deadline_shorter_than_max_runtime_wins() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = quiet_settings(&temp.path().join("out"));
    assert_eq!(settings.max_runtime, Duration::from_secs(1800));
    let provider = ScriptedProvider::new(
        vec![Reply::Stall(Duration::from_secs(5))],
        Reply::Text("package demo".to_string()),
    );
    let mut orchestrator = Orchestrator::new(
        provider,
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );

    let started = Instant::now();
    let err = orchestrator
        .run_within("todo service", Deadline::starting_now(Duration::from_millis(300)))
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));
    let RunError::Timeout(exceeded) = err else {
        panic!("expected timeout, got {err}");
    };
    assert_eq!(exceeded.limit, Duration::from_millis(300));

    let tasks = orchestrator.ledger().list_tasks().expect("tasks");
    assert_eq!(tasks[0].status, TaskStatus::Running);
    assert!(tasks[0].error.is_none());
}

#[test]
fn oversized_output_fails_without_persisting() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("out");
    let mut settings = quiet_settings(&out);
    settings.max_output_bytes = 4;
    let mut orchestrator = Orchestrator::new(
        ScriptedProvider::repeating(FENCED_DEMO),
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );

    let err = orchestrator.run("todo service").unwrap_err();
    assert!(matches!(
        err,
        RunError::Task {
            error: TaskError::OutputTooLarge { size: 12, limit: 4 },
            ..
        }
    ));

    let tasks = orchestrator.ledger().list_tasks().expect("tasks");
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert!(tasks[0].output.is_none());
    assert!(orchestrator.ledger().list_files(&tasks[0].id).expect("files").is_empty());
    assert!(!out.join(TaskKind::GenerateModels.artifact_path()).exists());
}

#[test]
fn missing_prompt_fails_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut orchestrator = Orchestrator::new(
        ScriptedProvider::repeating("package demo"),
        StaticPromptSource::new(TEMPLATE).missing(TaskKind::GenerateRepository),
        open_ledger(temp.path()),
        quiet_settings(&temp.path().join("out")),
    );

    let err = orchestrator.run("todo service").unwrap_err();
    assert!(matches!(
        err,
        RunError::Task {
            kind: TaskKind::GenerateRepository,
            error: TaskError::PromptLoad(_),
            ..
        }
    ));
    let counts = orchestrator.summary().expect("summary").counts;
    assert_eq!((counts.complete, counts.failed, counts.pending), (2, 1, 1));
}

#[test]
fn repeated_runs_share_one_ledger() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut orchestrator = Orchestrator::new(
        ScriptedProvider::repeating("package demo"),
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        quiet_settings(&temp.path().join("out")),
    );

    let first = orchestrator.run("todo service").expect("first run");
    let second = orchestrator.run("todo service").expect("second run");
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.stats.total_tasks, 4);

    let tasks = orchestrator.ledger().list_tasks().expect("tasks");
    assert_eq!(tasks.len(), 8);
    assert!(tasks[..4].iter().all(|t| t.id.starts_with(&first.run_id)));
    assert!(tasks[4..].iter().all(|t| t.id.starts_with(&second.run_id)));
}

#[test]
fn validation_problems_do_not_fail_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut settings = quiet_settings(&temp.path().join("out"));
    settings.validation = passing_validation();
    settings.validation.build = sh("echo 'undefined: Todo' >&2; exit 1");
    settings.validation.format_write = sh("exit 3");

    let mut orchestrator = Orchestrator::new(
        ScriptedProvider::repeating("package demo"),
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );
    let report = orchestrator.run("todo service").expect("run");

    let validation = report.validation.report().expect("validation ran");
    assert!(!validation.passed());
    assert!(validation.results[2].output.contains("undefined: Todo"));
    assert!(report.format_error.is_some());
    assert!(report.stats.completed());
}

#[test]
fn missing_toolchain_skips_validation() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut settings = quiet_settings(&temp.path().join("out"));
    settings.validation = passing_validation();
    settings.validation.toolchain_probe = vec!["overnight-missing-go".to_string()];

    let mut orchestrator = Orchestrator::new(
        ScriptedProvider::repeating("package demo"),
        StaticPromptSource::new(TEMPLATE),
        open_ledger(temp.path()),
        settings,
    );
    let report = orchestrator.run("todo service").expect("run");
    assert!(matches!(
        report.validation,
        ValidationOutcome::ToolchainMissing { .. }
    ));
}
