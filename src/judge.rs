//! Judge stage: run the test suite and classify the outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::{ProcessConfig, spawn_and_stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    /// Tests ran and failed; another attempt may help.
    FailRetry,
    /// Tests could not run at all.
    FailFatal,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::FailRetry => write!(f, "FAIL_RETRY"),
            Verdict::FailFatal => write!(f, "FAIL_FATAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeResult {
    pub verdict: Verdict,
    pub output: String,
    pub exit_code: i32,
}

pub struct JudgeRequest<'a> {
    pub project_root: &'a Path,
    pub file: &'a Path,
}

pub trait Judge {
    fn judge(
        &self,
        request: &JudgeRequest<'_>,
    ) -> impl std::future::Future<Output = Result<JudgeResult>> + Send;
}

/// Map a pytest exit status to a verdict.
///
/// 0 passed; 1 tests failed and 5 nothing collected are retryable; 2 interrupted,
/// 3 internal error, 4 usage error, signals and anything else are fatal.
pub fn classify_exit(exit_code: i32, signal: Option<i32>) -> Verdict {
    if signal.is_some() {
        return Verdict::FailFatal;
    }
    match exit_code {
        0 => Verdict::Pass,
        1 | 5 => Verdict::FailRetry,
        _ => Verdict::FailFatal,
    }
}

/// Runs `python -m pytest -q` over the project root.
pub struct PytestJudge {
    python: String,
    timeout: Option<Duration>,
}

impl PytestJudge {
    pub fn new(python: String, timeout: Option<Duration>) -> Self {
        Self { python, timeout }
    }

    pub fn build_command(&self, project_root: &Path) -> (String, Vec<String>) {
        let args = vec![
            "-m".to_string(),
            "pytest".to_string(),
            "-q".to_string(),
            project_root.display().to_string(),
        ];
        (self.python.clone(), args)
    }
}

impl Judge for PytestJudge {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeResult> {
        let (command, args) = self.build_command(request.project_root);
        let output = spawn_and_stream(ProcessConfig {
            command,
            args,
            working_dir: PathBuf::from(request.project_root),
            timeout: self.timeout,
            log_prefix: "pytest".to_string(),
            quiet: false,
        })
        .await
        .map_err(|e| Error::Judge(e.to_string()))?;

        Ok(JudgeResult {
            verdict: classify_exit(output.exit_code, output.signal),
            output: output.combined(),
            exit_code: output.exit_code,
        })
    }
}
