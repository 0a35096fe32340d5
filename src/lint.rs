//! Static analysis collaborator: quality score plus diagnostics.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::process::{ProcessConfig, spawn_and_stream};

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rated at\s+(-?[0-9]+(?:\.[0-9]+)?)/10").expect("valid regex"));

static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<path>[^:\n]+):(?P<line>\d+):(?P<col>\d+): (?P<code>[A-Z]\d{4}): (?P<msg>.*?)(?: \((?P<symbol>[a-z0-9-]+)\))?$",
    )
    .expect("valid regex")
});

/// pylint sets this bit in its exit status on a usage error.
const PYLINT_USAGE_ERROR: i32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub symbol: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LintReport {
    /// Score out of 10, absent when the tool printed none.
    pub score: Option<f64>,
    pub diagnostics: Vec<Diagnostic>,
    pub raw: String,
}

impl LintReport {
    /// One line per diagnostic, as shown to the auditor.
    pub fn render_diagnostics(&self) -> String {
        if self.diagnostics.is_empty() {
            return "No diagnostics reported.".to_string();
        }
        self.diagnostics
            .iter()
            .map(|d| format!("{} line {}: {}", d.code, d.line, d.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub trait Linter {
    /// Score `content`, which belongs to `file`. The file on disk is not read.
    fn lint(
        &self,
        file: &Path,
        content: &str,
    ) -> impl std::future::Future<Output = Result<LintReport>> + Send;
}

/// Runs `python -m pylint` on a scratch copy of the content.
pub struct PylintLinter {
    python: String,
    timeout: Option<Duration>,
}

impl PylintLinter {
    pub fn new(python: String, timeout: Option<Duration>) -> Self {
        Self { python, timeout }
    }

    pub fn build_command(&self, scratch: &Path) -> (String, Vec<String>) {
        let args = vec![
            "-m".to_string(),
            "pylint".to_string(),
            "--output-format=text".to_string(),
            "--score=y".to_string(),
            scratch.display().to_string(),
        ];
        (self.python.clone(), args)
    }
}

impl Linter for PylintLinter {
    async fn lint(&self, file: &Path, content: &str) -> Result<LintReport> {
        let scratch_dir = tempfile::tempdir()
            .map_err(|e| Error::Lint(format!("failed to create scratch dir: {e}")))?;
        let file_name = file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("module.py"));
        let scratch = scratch_dir.path().join(file_name);
        std::fs::write(&scratch, content)
            .map_err(|e| Error::Lint(format!("failed to write scratch copy: {e}")))?;

        let (command, args) = self.build_command(&scratch);
        let working_dir = file
            .parent()
            .filter(|p| p.is_dir())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| scratch_dir.path().to_path_buf());

        let output = spawn_and_stream(ProcessConfig {
            command,
            args,
            working_dir,
            timeout: self.timeout,
            log_prefix: "pylint".to_string(),
            quiet: true,
        })
        .await
        .map_err(|e| Error::Lint(e.to_string()))?;

        if let Some(sig) = output.signal {
            return Err(Error::Lint(format!("pylint killed by signal {sig}")));
        }
        if output.exit_code < 0 || output.exit_code & PYLINT_USAGE_ERROR != 0 {
            return Err(Error::Lint(format!(
                "pylint failed with exit code {}: {}",
                output.exit_code,
                output.stderr_lines.join("\n")
            )));
        }

        Ok(parse_pylint_output(&output.combined()))
    }
}

pub fn parse_pylint_output(raw: &str) -> LintReport {
    let diagnostics = raw
        .lines()
        .filter_map(|line| {
            let caps = MESSAGE_RE.captures(line.trim_end())?;
            Some(Diagnostic {
                line: caps["line"].parse().ok()?,
                column: caps["col"].parse().ok()?,
                code: caps["code"].to_string(),
                symbol: caps.name("symbol").map(|m| m.as_str().to_string()),
                message: caps["msg"].to_string(),
            })
        })
        .collect();

    LintReport {
        score: extract_score(raw),
        diagnostics,
        raw: raw.to_string(),
    }
}

/// Extract the `rated at X/10` score from pylint output.
pub fn extract_score(text: &str) -> Option<f64> {
    SCORE_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
STDOUT:
************* Module calc
/tmp/x/calc.py:1:0: C0114: Missing module docstring (missing-module-docstring)
/tmp/x/calc.py:3:0: C0116: Missing function or method docstring (missing-function-docstring)
/tmp/x/calc.py:4:4: W0612: Unused variable 'tmp' (unused-variable)

------------------------------------------------------------------
Your code has been rated at 5.71/10 (previous run: 4.00/10, +1.71)

STDERR:
";

    #[test]
    fn test_extract_score() {
        assert_eq!(extract_score(SAMPLE), Some(5.71));
        assert_eq!(extract_score("Your code has been rated at 10.00/10"), Some(10.0));
        assert_eq!(extract_score("rated at -2.5/10"), Some(-2.5));
        assert_eq!(extract_score("no score here"), None);
    }

    #[test]
    fn test_parse_diagnostics() {
        let report = parse_pylint_output(SAMPLE);
        assert_eq!(report.diagnostics.len(), 3);
        let first = &report.diagnostics[0];
        assert_eq!(first.line, 1);
        assert_eq!(first.column, 0);
        assert_eq!(first.code, "C0114");
        assert_eq!(first.symbol.as_deref(), Some("missing-module-docstring"));
        assert_eq!(first.message, "Missing module docstring");
        assert_eq!(report.diagnostics[2].message, "Unused variable 'tmp'");
        assert_eq!(report.score, Some(5.71));
    }

    #[test]
    fn test_parse_ignores_noise() {
        let report = parse_pylint_output("************* Module x\nrandom text\n");
        assert!(report.diagnostics.is_empty());
        assert!(report.score.is_none());
    }

    #[test]
    fn test_render_diagnostics() {
        let report = parse_pylint_output(SAMPLE);
        let rendered = report.render_diagnostics();
        assert!(rendered.starts_with("C0114 line 1: Missing module docstring\n"));
        assert_eq!(rendered.lines().count(), 3);
        assert_eq!(
            LintReport::default().render_diagnostics(),
            "No diagnostics reported."
        );
    }

    #[test]
    fn test_build_command() {
        let linter = PylintLinter::new("python3".to_string(), None);
        let (cmd, args) = linter.build_command(Path::new("/tmp/s/calc.py"));
        assert_eq!(cmd, "python3");
        assert_eq!(args[0], "-m");
        assert_eq!(args[1], "pylint");
        assert_eq!(args.last().unwrap(), "/tmp/s/calc.py");
    }
}
