//! Command-line entry point: parse arguments, wire the runtime, drive
//! one task to completion, and render the result.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quill_agent_core::CooperativeCancellationToken;
use quill_core::{collapse_whitespace, truncate_chars};
use quill_orchestrator::{AgentState, TaskStatus};

mod bootstrap;
mod cli_args;
mod example_tasks;
mod transcript;

use cli_args::Cli;
use transcript::TranscriptLogger;

/// Per-file cap for injected context.
const FILE_CONTEXT_MAX_CHARS: usize = 8_000;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if cli.list_examples {
        println!("Available example tasks:\n");
        for (name, text) in example_tasks::EXAMPLE_TASKS {
            println!("  {name}:");
            println!("    {}\n", truncate_chars(text, 100));
        }
        return Ok(());
    }

    let task = match cli.task.as_deref() {
        None => {
            println!("No task specified, running default example: market_analysis\n");
            example_tasks::lookup("market_analysis")
                .context("default example missing")?
                .to_string()
        }
        Some(name) => example_tasks::lookup(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string()),
    };

    let file_context = read_file_context(&cli.files)?;

    let logger = TranscriptLogger::new(&cli.log_dir)?;
    info!(transcript = %logger.hops_path().display(), "starting task");
    info!(task = %truncate_chars(&task, 200), "task text");

    let mut orchestrator = bootstrap::build_orchestrator(&cli).await?;

    let cancellation = CooperativeCancellationToken::new();
    orchestrator.set_cancellation_token(cancellation.clone());
    orchestrator.set_deadline(Duration::from_secs(cli.deadline_secs));
    let ctrlc_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current hop then stopping");
            ctrlc_token.cancel();
        }
    });

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    orchestrator.set_snapshot_sender(sender);
    let stream = cli.stream;
    let hop_logger = std::sync::Arc::new(logger);
    let consumer_logger = hop_logger.clone();
    let consumer = tokio::spawn(async move {
        while let Some(snapshot) = receiver.recv().await {
            if let Err(error) = consumer_logger.log_hop(&snapshot) {
                warn!(%error, "failed to log hop snapshot");
            }
            if stream {
                println!(
                    "[hop {}] {} ({} tool calls)",
                    snapshot.iteration, snapshot.agent, snapshot.tool_calls_made
                );
            }
        }
    });

    let state = AgentState::new_task(task, cli.max_iterations).with_file_context(file_context);
    let final_state = orchestrator.run(state).await;
    drop(orchestrator);
    let _ = consumer.await;

    let summary_path = hop_logger.write_summary(&final_state)?;
    info!(summary = %summary_path.display(), "run summary written");

    print_results(&final_state);
    if final_state.status == TaskStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Reads each file as UTF-8 text and formats it for prompt injection.
fn read_file_context(paths: &[std::path::PathBuf]) -> Result<String> {
    let mut sections = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading context file {}", path.display()))?;
        sections.push(format_file_context(path, &content));
    }
    Ok(sections.join("\n\n"))
}

fn format_file_context(path: &Path, content: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    format!(
        "--- ATTACHED FILE: {name} ---\n{}\n--- END FILE ---",
        truncate_chars(content, FILE_CONTEXT_MAX_CHARS)
    )
}

/// One-line step rendering: multi-paragraph specialist output is
/// flattened and capped.
fn step_summary(summary: &str) -> String {
    truncate_chars(&collapse_whitespace(summary), 500)
}

fn print_results(state: &AgentState) {
    println!("\n{}", "=".repeat(70));
    println!("  QUILL - TASK {}", match state.status {
        TaskStatus::Completed => "COMPLETE",
        TaskStatus::Failed => "FAILED",
        _ => "ENDED",
    });
    println!("{}", "=".repeat(70));

    if !state.results.is_empty() {
        println!("\n  Agent contributions ({} steps):", state.results.len());
        for (index, result) in state.results.iter().enumerate() {
            println!(
                "\n  -- Step {}: {} (tools called: {}) --",
                index + 1,
                result.agent,
                result.tool_calls_made
            );
            println!("  {}", step_summary(&result.summary));
        }
    }

    let final_output = state.final_synthesis();
    if !final_output.is_empty() {
        println!("\n{}", "-".repeat(70));
        println!("  FINAL OUTPUT:");
        println!("{}", "-".repeat(70));
        println!("{final_output}");
    }
    if !state.error.is_empty() {
        println!("\n  Error: {}", state.error);
    }
    println!("\n  Total iterations: {}", state.iteration);
    println!("{}\n", "=".repeat(70));
}
