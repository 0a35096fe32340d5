use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::OutputMode;
use crate::error::{Error, Result};
use crate::judge::Verdict;

/// One audit/fix/judge pass over a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub file: String,
    /// 1-based.
    pub iteration: u32,
    pub before_score: Option<f64>,
    pub after_score: Option<f64>,
    /// Absent when the iteration aborted before judging.
    pub verdict: Option<Verdict>,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Passed,
    Exhausted,
    Aborted,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Passed => write!(f, "PASS"),
            FileStatus::Exhausted => write!(f, "EXHAUSTED"),
            FileStatus::Aborted => write!(f, "ABORT"),
        }
    }
}

/// Terminal outcome of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub file: String,
    pub path: PathBuf,
    /// Where the accepted revision was written, if anywhere.
    pub dest: Option<PathBuf>,
    pub mode: OutputMode,
    pub status: FileStatus,
    pub reason: Option<String>,
    pub iterations: u32,
    pub before_score: Option<f64>,
    pub after_score: Option<f64>,
    /// Set when copy mode wrote the full content because blocks could not be identified.
    #[serde(default)]
    pub full_fallback: bool,
}

/// Mutable state of a run, owned by the orchestrator and lent to the controller.
#[derive(Debug, Default)]
pub struct RunState {
    pub file_index: usize,
    /// Iterations started for the current file.
    pub iteration: u32,
    pub before_total: f64,
    pub after_total: f64,
    pub scored_files: usize,
    pub records: Vec<IterationRecord>,
    pub results: Vec<FileResult>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_file(&mut self, index: usize) {
        self.file_index = index;
        self.iteration = 0;
    }

    pub fn record_iteration(&mut self, record: IterationRecord) {
        self.records.push(record);
    }

    pub fn finish_file(&mut self, result: FileResult) {
        if let (Some(before), Some(after)) = (result.before_score, result.after_score) {
            self.before_total += before;
            self.after_total += after;
            self.scored_files += 1;
        }
        self.results.push(result);
    }

    pub fn summary(&self) -> RunSummary {
        let count = |status| self.results.iter().filter(|r| r.status == status).count();
        let (before_avg, after_avg) = if self.scored_files == 0 {
            (None, None)
        } else {
            let n = self.scored_files as f64;
            (Some(self.before_total / n), Some(self.after_total / n))
        };
        RunSummary {
            processed: self.results.len(),
            passed: count(FileStatus::Passed),
            exhausted: count(FileStatus::Exhausted),
            aborted: count(FileStatus::Aborted),
            before_avg,
            after_avg,
            delta: before_avg.zip(after_avg).map(|(b, a)| a - b),
            results: self.results.clone(),
            records: self.records.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub passed: usize,
    pub exhausted: usize,
    pub aborted: usize,
    /// Mean scores over files scored both before and after.
    pub before_avg: Option<f64>,
    pub after_avg: Option<f64>,
    pub delta: Option<f64>,
    pub results: Vec<FileResult>,
    #[serde(default)]
    pub records: Vec<IterationRecord>,
}

impl RunSummary {
    pub fn save_toml(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Log(format!("failed to serialize run summary: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Human-readable summary, one line per file.
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "processed {}: {} passed, {} exhausted, {} aborted",
            self.processed, self.passed, self.exhausted, self.aborted
        )];
        if let (Some(before), Some(after), Some(delta)) = (self.before_avg, self.after_avg, self.delta)
        {
            lines.push(format!(
                "average score {before:.2} -> {after:.2} ({delta:+.2})"
            ));
        }
        for r in &self.results {
            let mut line = format!(
                "  {} [{}] {} -> {} ({} iteration{}, {})",
                r.status,
                r.mode,
                r.file,
                r.dest
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                r.iterations,
                if r.iterations == 1 { "" } else { "s" },
                format_scores(r.before_score, r.after_score),
            );
            if let Some(ref reason) = r.reason {
                line.push_str(&format!(": {reason}"));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn format_scores(before: Option<f64>, after: Option<f64>) -> String {
    let fmt = |s: Option<f64>| s.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
    format!("score {} -> {}", fmt(before), fmt(after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(file: &str, status: FileStatus, before: Option<f64>, after: Option<f64>) -> FileResult {
        FileResult {
            file: file.to_string(),
            path: PathBuf::from("/srv/code").join(file),
            dest: None,
            mode: OutputMode::Overwrite,
            status,
            reason: (status == FileStatus::Aborted).then(|| "lint error: pylint missing".to_string()),
            iterations: 1,
            before_score: before,
            after_score: after,
            full_fallback: false,
        }
    }

    #[test]
    fn test_begin_file_resets_iteration() {
        let mut state = RunState::new();
        state.iteration = 4;
        state.begin_file(2);
        assert_eq!(state.file_index, 2);
        assert_eq!(state.iteration, 0);
    }

    #[test]
    fn test_summary_counts_and_delta() {
        let mut state = RunState::new();
        state.finish_file(result("a.py", FileStatus::Passed, Some(5.0), Some(8.0)));
        state.finish_file(result("b.py", FileStatus::Exhausted, Some(3.0), Some(4.0)));
        state.finish_file(result("c.py", FileStatus::Aborted, None, None));

        let summary = state.summary();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.before_avg, Some(4.0));
        assert_eq!(summary.after_avg, Some(6.0));
        assert_eq!(summary.delta, Some(2.0));

        let text = summary.render();
        assert!(text.starts_with("processed 3: 1 passed, 1 exhausted, 1 aborted"));
        assert!(text.contains("average score 4.00 -> 6.00 (+2.00)"));
        assert!(text.contains("ABORT [overwrite] c.py"));
        assert!(text.contains("lint error: pylint missing"));
    }

    #[test]
    fn test_summary_without_scores() {
        let summary = RunState::new().summary();
        assert_eq!(summary.processed, 0);
        assert!(summary.delta.is_none());
        assert!(!summary.render().contains("average score"));
    }

    #[test]
    fn test_save_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/run.toml");
        let mut state = RunState::new();
        state.record_iteration(IterationRecord {
            file: "a.py".to_string(),
            iteration: 1,
            before_score: Some(5.0),
            after_score: Some(8.0),
            verdict: Some(Verdict::Pass),
            note: "exit code 0".to_string(),
        });
        state.finish_file(result("a.py", FileStatus::Passed, Some(5.0), Some(8.0)));
        let summary = state.summary();
        summary.save_toml(&path).unwrap();

        let loaded: RunSummary = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, summary);
    }
}
