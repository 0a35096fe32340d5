use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = ".refactor-swarm.toml";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_OUTPUT_DIR: &str = "refactored";
pub const DEFAULT_LOG_FILE: &str = "logs/experiment_data.jsonl";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Overwrite,
    Copy,
}

impl OutputMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "overwrite" => Ok(OutputMode::Overwrite),
            "copy" => Ok(OutputMode::Copy),
            other => Err(Error::ConfigValidation(format!(
                "unknown output_mode: {other} (expected: overwrite, copy)"
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Overwrite => write!(f, "overwrite"),
            OutputMode::Copy => write!(f, "copy"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub output_mode: Option<String>,
    pub output_dir: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub max_files: Option<usize>,
    pub cooldown: Option<u64>,
    pub disable_llm: Option<bool>,
    pub log_file: Option<String>,
    pub api_key_env: Option<String>,
    pub api_base: Option<String>,
    pub python: Option<String>,
    pub lint_timeout: Option<u64>,
    pub test_timeout: Option<u64>,
    pub model_timeout: Option<u64>,
    pub exclude_dirs: Option<Vec<String>>,
    pub prompts_dir: Option<String>,
}

/// Run configuration, immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub target_dir: PathBuf,
    pub output_mode: OutputMode,
    /// Present iff `output_mode` is `Copy`.
    pub output_dir: Option<PathBuf>,
    pub model: String,
    pub max_iterations: u32,
    pub max_files: usize,
    pub cooldown: u64,
    pub deterministic: bool,
    pub log_file: PathBuf,
    pub report: Option<PathBuf>,
    pub api_key_env: String,
    pub api_base: String,
    pub python: String,
    pub lint_timeout: u64,
    pub test_timeout: u64,
    pub model_timeout: u64,
    pub exclude_dirs: Vec<String>,
    pub prompts_dir: Option<String>,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        merge(file_config, cli)
    }

    /// Identifier recorded in the experiment log for model-backed stages.
    pub fn model_label(&self) -> &str {
        if self.deterministic {
            "deterministic"
        } else {
            &self.model
        }
    }

    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(ref mode) = config.output_mode {
        OutputMode::parse(mode)?;
    }
    if let Some(max) = config.max_iterations
        && max == 0
    {
        return Err(Error::ConfigValidation(
            "max_iterations must be > 0".to_string(),
        ));
    }
    for (name, value) in [
        ("lint_timeout", config.lint_timeout),
        ("test_timeout", config.test_timeout),
        ("model_timeout", config.model_timeout),
    ] {
        if value == Some(0) {
            return Err(Error::ConfigValidation(format!("{name} must be > 0")));
        }
    }
    if let Some(ref python) = config.python
        && python.trim().is_empty()
    {
        return Err(Error::ConfigValidation(
            "python must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let target_dir = PathBuf::from(&cli.target_dir);

    let output_mode = match cli.output_mode.as_deref().or(file.output_mode.as_deref()) {
        Some(mode) => OutputMode::parse(mode)?,
        None => OutputMode::Overwrite,
    };

    let output_dir = match output_mode {
        OutputMode::Copy => {
            let dir = cli
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
            if dir.trim().is_empty() {
                return Err(Error::ConfigValidation(
                    "output_dir must not be empty".to_string(),
                ));
            }
            let dir = PathBuf::from(dir);
            Some(if dir.is_absolute() {
                dir
            } else {
                target_dir.join(dir)
            })
        }
        OutputMode::Overwrite => {
            if cli.output_dir.is_some() {
                return Err(Error::ConfigValidation(
                    "--output-dir requires --output-mode copy".to_string(),
                ));
            }
            None
        }
    };

    let max_iterations = cli
        .max_iterations
        .or(file.max_iterations)
        .unwrap_or(DEFAULT_MAX_ITERATIONS);
    if max_iterations == 0 {
        return Err(Error::ConfigValidation(
            "max_iterations must be > 0".to_string(),
        ));
    }

    Ok(Config {
        target_dir,
        output_mode,
        output_dir,
        model: cli
            .model
            .clone()
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        max_iterations,
        max_files: cli.max_files.or(file.max_files).unwrap_or(0),
        cooldown: cli.cooldown.or(file.cooldown).unwrap_or(0),
        deterministic: cli.disable_llm || file.disable_llm.unwrap_or(false),
        log_file: PathBuf::from(
            cli.log_file
                .clone()
                .or(file.log_file)
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        ),
        report: cli.report.as_ref().map(PathBuf::from),
        api_key_env: file
            .api_key_env
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
        api_base: file
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        python: file.python.unwrap_or_else(|| "python3".to_string()),
        lint_timeout: file.lint_timeout.unwrap_or(120),
        test_timeout: file.test_timeout.unwrap_or(600),
        model_timeout: file.model_timeout.unwrap_or(120),
        exclude_dirs: file
            .exclude_dirs
            .unwrap_or_else(|| vec!["tests".to_string(), "venv".to_string()]),
        prompts_dir: file.prompts_dir,
    })
}
