//! Investigation tests against a live completion provider and Go toolchain.
//!
//! These tests are ignored by default because they need a running
//! Ollama-compatible server with the default model pulled, and `go` on PATH.
//!
//! # Running
//!
//! ```bash
//! ollama serve &
//! ollama pull codellama:7b
//! cargo test -p overnight --test investigation_provider -- --ignored
//! ```

use std::time::Duration;

use overnight::core::sanitize::sanitize;
use overnight::io::config::{Config, ProviderConfig};
use overnight::io::ledger::Ledger;
use overnight::io::prompt::BuiltinPrompts;
use overnight::io::provider::{CompletionProvider, OllamaProvider};
use overnight::pipeline::{Orchestrator, RunSettings};

/// Generous budget for a single completion on a local model.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

fn live_provider() -> OllamaProvider {
    OllamaProvider::new(&ProviderConfig::default()).expect("provider")
}

#[test]
#[ignore]
fn provider_is_healthy() {
    live_provider()
        .health_check()
        .expect("provider not ready - run `ollama serve` and pull the model");
}

#[test]
#[ignore]
fn completion_sanitizes_to_go_source() {
    let raw = live_provider()
        .complete(
            "Write a Go file for package demo declaring `const Answer = 42`. Output only code.",
            COMPLETION_TIMEOUT,
        )
        .expect("complete");
    println!("raw completion:\n{raw}");

    let cleaned = sanitize(&raw);
    assert!(cleaned.contains("package demo"), "{cleaned}");
    assert!(!cleaned.contains("```"), "{cleaned}");
}

#[test]
#[ignore]
fn full_run_with_live_provider() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ledger = Ledger::open(&temp.path().join("ledger.db")).expect("ledger");
    let settings = RunSettings::from_config(&Config::default(), temp.path().join("generated"));
    let mut orchestrator = Orchestrator::new(live_provider(), BuiltinPrompts, ledger, settings);

    let report = orchestrator.run("REST API for todo list").expect("run");
    println!("{}", orchestrator.summary().expect("summary"));
    if let Some(validation) = report.validation.report() {
        println!("{validation}");
    }
    assert!(report.stats.completed());
}
