//! Append-only JSON-lines record of every stage invocation.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Summaries longer than this many characters are cut.
pub const SUMMARY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStage {
    RunStart,
    Select,
    Audit,
    Fix,
    Judge,
    Materialize,
    RunEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Startup,
    Analysis,
    Fix,
    Debug,
    Write,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
    Retry,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentLogEntry {
    pub timestamp: String,
    pub stage: LogStage,
    pub model: String,
    pub input_summary: String,
    pub output_summary: String,
    pub action: Action,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ExperimentLogEntry {
    pub fn new(stage: LogStage, model: &str, action: Action, status: Status) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            stage,
            model: model.to_string(),
            input_summary: String::new(),
            output_summary: String::new(),
            action,
            status,
            file: None,
        }
    }

    pub fn input(mut self, text: &str) -> Self {
        self.input_summary = truncate_summary(text, SUMMARY_LIMIT);
        self
    }

    pub fn output(mut self, text: &str) -> Self {
        self.output_summary = truncate_summary(text, SUMMARY_LIMIT);
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((idx, _)) => format!("{}...", &text[..idx]),
    }
}

pub struct ExperimentLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ExperimentLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Log(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Log(format!("failed to open {}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line.
    pub fn append(&self, entry: &ExperimentLogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| Error::Log(format!("failed to encode entry: {e}")))?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| Error::Log("experiment log lock poisoned".to_string()))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::Log(format!("failed to write {}: {e}", self.path.display())))
    }

    /// Append, downgrading failures to a warning.
    pub fn record(&self, entry: ExperimentLogEntry) {
        if let Err(e) = self.append(&entry) {
            warn!(error = %e, stage = ?entry.stage, "experiment log entry dropped");
        }
    }
}

/// Read every entry of a log file, skipping lines that do not parse.
pub fn read_entries(path: &Path) -> Result<Vec<ExperimentLogEntry>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Log(format!("failed to read {}: {e}", path.display())))?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
