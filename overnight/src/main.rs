//! Unattended code generation runner.
//!
//! `overnight generate` drives one run: provider health check, the fixed task
//! sequence, scaffold, validation and a final summary read back from the
//! ledger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use overnight::exit_codes;
use overnight::io::config::{Config, load_config};
use overnight::io::ledger::Ledger;
use overnight::io::prompt::{BuiltinPrompts, DirPrompts, PromptSource};
use overnight::io::provider::{CompletionProvider, OllamaProvider};
use overnight::io::snapshot::{SNAPSHOT_FILE, ValidationOutcome};
use overnight::logging;
use overnight::pipeline::{Orchestrator, RunSettings, ledger_summary};

#[derive(Parser)]
#[command(
    name = "overnight",
    version,
    about = "Unattended multi-stage code generation runner"
)]
struct Cli {
    /// Config file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "overnight.toml")]
    config: PathBuf,

    /// SQLite ledger path.
    #[arg(long, global = true, default_value = "./poc.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the project: health check, tasks, scaffold, validation.
    Generate(GenerateArgs),
    /// Print the summary of every task in the ledger.
    Summary {
        /// Output directory to show in the summary.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete every task and file record from the ledger.
    Purge,
    /// Check that the provider is reachable and the model is available.
    Health(ProviderArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Description of what to generate.
    #[arg(long, default_value = "REST API for todo list")]
    prompt: String,

    /// Output directory for generated code.
    #[arg(long, default_value = "./generated")]
    output: PathBuf,

    /// Directory of `<kind>.txt` prompt templates.
    #[arg(long)]
    prompts: Option<PathBuf>,

    /// Skip the validation chain after generation.
    #[arg(long)]
    skip_validation: bool,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args)]
struct ProviderArgs {
    /// Provider API endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Model to use for generation.
    #[arg(long)]
    model: Option<String>,
}

impl ProviderArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.provider.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => cmd_generate(&cli.config, &cli.db, &args),
        Command::Summary { output } => cmd_summary(&cli.db, output),
        Command::Purge => cmd_purge(&cli.db),
        Command::Health(args) => cmd_health(&cli.config, &args),
    }
}

fn load_with_overrides(path: &Path, apply: impl FnOnce(&mut Config)) -> Result<Config> {
    let mut config = load_config(path)?;
    apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn cmd_generate(config_path: &Path, db: &Path, args: &GenerateArgs) -> Result<i32> {
    let config = load_with_overrides(config_path, |config| {
        args.provider.apply(config);
        if let Some(dir) = &args.prompts {
            config.prompts_dir = Some(dir.clone());
        }
        if args.skip_validation {
            config.validation.enabled = false;
        }
    })?;

    let provider = OllamaProvider::new(&config.provider)?;
    if let Err(err) = provider.health_check() {
        print_prerequisites(&provider, &err);
        return Ok(exit_codes::PROVIDER_UNAVAILABLE);
    }
    println!("Provider ready at {} ({})", provider.endpoint(), provider.model());

    let ledger = Ledger::open(db).with_context(|| format!("open ledger {}", db.display()))?;
    let prompts: Box<dyn PromptSource> = match &config.prompts_dir {
        Some(dir) => Box::new(DirPrompts::new(dir)),
        None => Box::new(BuiltinPrompts),
    };
    let settings = RunSettings::from_config(&config, &args.output);
    let model = provider.model().to_string();
    let mut orchestrator = Orchestrator::new(provider, prompts, ledger, settings);

    let rule = "=".repeat(60);
    println!("{rule}");
    println!("STARTING CODE GENERATION");
    println!("{rule}");
    println!("Task:        {}", args.prompt);
    println!("Output:      {}", args.output.display());
    println!("Model:       {model}");
    println!("Database:    {}", db.display());
    println!("{rule}");

    let code = match orchestrator.run(&args.prompt) {
        Ok(report) => {
            match &report.validation {
                ValidationOutcome::Disabled => {}
                ValidationOutcome::ToolchainMissing { reason } => {
                    println!("Go toolchain not found: {reason}");
                    println!("Skipping validation (Go required for validation)");
                }
                ValidationOutcome::Ran { report } => print!("\n{report}"),
            }
            if let Some(err) = &report.format_error {
                println!("Failed to format code: {err}");
            }
            if let Some(err) = &report.snapshot_error {
                println!("Failed to write {SNAPSHOT_FILE}: {err}");
            }
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("Generation failed: {err}");
            exit_codes::GENERATION_FAILED
        }
    };

    match orchestrator.summary() {
        Ok(summary) => print!("\n{summary}"),
        Err(err) => eprintln!("Failed to load tasks: {err}"),
    }
    if code == exit_codes::OK {
        print_next_steps(&args.output);
    } else {
        print_troubleshooting(&orchestrator.settings().output_dir, db);
    }
    Ok(code)
}

fn cmd_summary(db: &Path, output: Option<PathBuf>) -> Result<i32> {
    let ledger = Ledger::open(db).with_context(|| format!("open ledger {}", db.display()))?;
    let summary = ledger_summary(&ledger, None, output).context("load tasks")?;
    print!("{summary}");
    Ok(exit_codes::OK)
}

fn cmd_purge(db: &Path) -> Result<i32> {
    let ledger = Ledger::open(db).with_context(|| format!("open ledger {}", db.display()))?;
    ledger.purge_all().context("purge ledger")?;
    println!("Purged all tasks from {}", db.display());
    Ok(exit_codes::OK)
}

fn cmd_health(config_path: &Path, args: &ProviderArgs) -> Result<i32> {
    let config = load_with_overrides(config_path, |config| args.apply(config))?;
    let provider = OllamaProvider::new(&config.provider)?;
    match provider.health_check() {
        Ok(()) => {
            println!("Provider ready at {} ({})", provider.endpoint(), provider.model());
            Ok(exit_codes::OK)
        }
        Err(err) => {
            print_prerequisites(&provider, &err);
            Ok(exit_codes::PROVIDER_UNAVAILABLE)
        }
    }
}

fn print_prerequisites(provider: &OllamaProvider, err: &anyhow::Error) {
    eprintln!("Provider health check failed: {err:#}");
    eprintln!();
    eprintln!("Prerequisites:");
    eprintln!("  1. Start the provider service:");
    eprintln!("     ollama serve");
    eprintln!("  2. Pull the required model:");
    eprintln!("     ollama pull {}", provider.model());
}

fn print_troubleshooting(output: &Path, db: &Path) {
    eprintln!();
    eprintln!("Troubleshooting tips:");
    eprintln!("  - Check the provider is running: curl <endpoint>/api/tags");
    eprintln!("  - Try a smaller model if running out of memory");
    eprintln!("  - Check the generated files in: {}", output.display());
    eprintln!("  - Review {} for task details", db.display());
}

fn print_next_steps(output: &Path) {
    let rule = "=".repeat(60);
    println!();
    println!("{rule}");
    println!("NEXT STEPS");
    println!("{rule}");
    println!("  cd {}", output.display());
    println!("  go mod download");
    println!("  go test -v ./...");
    println!("  go run cmd/server/main.go");
    println!();
    println!("Status: {}", output.join(SNAPSHOT_FILE).display());
}
