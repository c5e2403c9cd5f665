use std::path::PathBuf;

use clap::Parser;

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "quill",
    about = "Multi-agent financial research orchestrator",
    version
)]
/// Public struct `Cli` used across Quill components.
pub struct Cli {
    #[arg(help = "Task description (free text) or the name of an example task")]
    pub task: Option<String>,

    #[arg(
        long = "max-iterations",
        env = "QUILL_MAX_ITERATIONS",
        default_value_t = 15,
        value_parser = parse_positive_u32,
        help = "Maximum orchestration hops before the task is failed"
    )]
    pub max_iterations: u32,

    #[arg(
        long,
        env = "QUILL_PROVIDER",
        default_value = "groq",
        help = "LLM provider: together, groq, fireworks, openrouter"
    )]
    pub provider: String,

    #[arg(
        long,
        env = "QUILL_MODEL",
        help = "Model override; defaults to the provider's per-role model"
    )]
    pub model: Option<String>,

    #[arg(long, help = "Print each hop as it completes")]
    pub stream: bool,

    #[arg(long = "list-examples", help = "List available example tasks and exit")]
    pub list_examples: bool,

    #[arg(
        long = "file",
        help = "Path to a text file to include as context. Repeatable."
    )]
    pub files: Vec<PathBuf>,

    #[arg(
        long = "log-dir",
        env = "QUILL_LOG_DIR",
        default_value = "logs",
        help = "Directory for conversation transcripts"
    )]
    pub log_dir: PathBuf,

    #[arg(
        long = "deadline-secs",
        env = "QUILL_DEADLINE_SECS",
        default_value_t = 600,
        value_parser = |v: &str| parse_positive_u32(v).map(u64::from),
        help = "Wall-clock budget for the whole task, in seconds"
    )]
    pub deadline_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn unit_defaults_parse() {
        let cli = Cli::parse_from(["quill", "Analyze AAPL"]);
        assert_eq!(cli.task.as_deref(), Some("Analyze AAPL"));
        assert_eq!(cli.max_iterations, 15);
        assert_eq!(cli.provider, "groq");
        assert!(!cli.stream);
        assert!(cli.files.is_empty());
    }

    #[test]
    fn unit_zero_iterations_rejected() {
        assert!(Cli::try_parse_from(["quill", "--max-iterations", "0", "task"]).is_err());
    }

    #[test]
    fn unit_repeatable_files() {
        let cli = Cli::parse_from(["quill", "--file", "a.txt", "--file", "b.csv", "task"]);
        assert_eq!(cli.files.len(), 2);
    }
}
