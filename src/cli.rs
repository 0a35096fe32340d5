use clap::Parser;

/// refactor-swarm: iteratively refactor and test-gate the Python files in a directory
#[derive(Parser, Debug, Clone)]
#[command(name = "refactor-swarm", version, about)]
pub struct Cli {
    /// Directory whose Python files are refactored
    #[arg(long, alias = "target_dir")]
    pub target_dir: String,

    /// Seconds to wait before a failed iteration is retried
    #[arg(long)]
    pub cooldown: Option<u64>,

    /// Deterministic mode: no model calls, plans come from lint diagnostics only
    #[arg(long, alias = "disable_llm")]
    pub disable_llm: bool,

    /// Output mode (overwrite, copy)
    #[arg(long, alias = "output_mode")]
    pub output_mode: Option<String>,

    /// Copy-mode output directory, relative to the target directory unless absolute
    #[arg(long, alias = "output_dir")]
    pub output_dir: Option<String>,

    /// Model identifier passed to the chat-completions endpoint
    #[arg(long)]
    pub model: Option<String>,

    /// Stop after this many files (0 = no limit)
    #[arg(long, alias = "max_files")]
    pub max_files: Option<usize>,

    /// Maximum audit/fix/judge cycles per file
    #[arg(long, alias = "max_iterations")]
    pub max_iterations: Option<u32>,

    /// Path to config file
    #[arg(long)]
    pub config: Option<String>,

    /// Experiment log file (JSON lines, appended)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Write the run summary to this TOML file
    #[arg(long)]
    pub report: Option<String>,
}
