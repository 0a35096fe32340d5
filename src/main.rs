use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use refactor_swarm::audit::{AnyAuditor, DiagnosticAuditor, ModelAuditor};
use refactor_swarm::cli::Cli;
use refactor_swarm::config::Config;
use refactor_swarm::error::Error;
use refactor_swarm::fix::{AnyFixer, ModelFixer, PassthroughFixer};
use refactor_swarm::judge::PytestJudge;
use refactor_swarm::lint::PylintLinter;
use refactor_swarm::model::{ChatClient, resolve_api_key};
use refactor_swarm::orchestrator::RunOrchestrator;
use refactor_swarm::prompts::PromptEngine;

const EXIT_CONFIG: i32 = 1;
const EXIT_NO_FILES: i32 = 3;
const EXIT_PATH_VIOLATION: i32 = 4;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();
}

fn exit_code(e: &Error) -> i32 {
    match e {
        Error::NoFilesFound(_) => EXIT_NO_FILES,
        Error::PathViolation { .. } => EXIT_PATH_VIOLATION,
        _ => EXIT_CONFIG,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    info!("refactor-swarm starting");

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    info!(
        target = %config.target_dir.display(),
        mode = %config.output_mode,
        model = config.model_label(),
        max_iterations = config.max_iterations,
        "config loaded"
    );

    let api_key = match resolve_api_key(&config) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let (auditor, fixer) = match api_key {
        Some(key) => (
            AnyAuditor::Model(ModelAuditor::new(
                PromptEngine::new(config.prompts_dir.clone()),
                ChatClient::from_config(&config, key.clone()),
            )),
            AnyFixer::Model(ModelFixer::new(
                PromptEngine::new(config.prompts_dir.clone()),
                ChatClient::from_config(&config, key),
            )),
        ),
        None => (
            AnyAuditor::Diagnostics(DiagnosticAuditor),
            AnyFixer::Passthrough(PassthroughFixer),
        ),
    };
    let linter = PylintLinter::new(
        config.python.clone(),
        Some(Duration::from_secs(config.lint_timeout)),
    );
    let judge = PytestJudge::new(
        config.python.clone(),
        Some(Duration::from_secs(config.test_timeout)),
    );

    let orchestrator = match RunOrchestrator::new(config, linter, auditor, fixer, judge) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
    };

    match orchestrator.run().await {
        Ok(summary) => {
            info!(
                passed = summary.passed,
                exhausted = summary.exhausted,
                aborted = summary.aborted,
                "run complete"
            );
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
    }
}
