#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use refactor_swarm::audit::{AuditOutput, AuditRequest, Auditor, StageTrace};
use refactor_swarm::config::{Config, DEFAULT_MODEL, OutputMode};
use refactor_swarm::discover::TargetFile;
use refactor_swarm::error::{Error, Result};
use refactor_swarm::fix::{FixOutput, FixRequest, Fixer};
use refactor_swarm::judge::{Judge, JudgeRequest, JudgeResult, Verdict};
use refactor_swarm::lint::{Diagnostic, LintReport, Linter};
use refactor_swarm::orchestrator::ProgressReporter;
use refactor_swarm::plan::RefactorPlan;
use refactor_swarm::state::{FileResult, RunSummary};

/// Sensible default `Config` for tests. Callers can override fields via struct update syntax.
pub fn test_config(target: &Path, log_file: &Path) -> Config {
    Config {
        target_dir: target.to_path_buf(),
        output_mode: OutputMode::Overwrite,
        output_dir: None,
        model: DEFAULT_MODEL.to_string(),
        max_iterations: 3,
        max_files: 0,
        cooldown: 0,
        deterministic: true,
        log_file: log_file.to_path_buf(),
        report: None,
        api_key_env: "SWARM_TEST_UNUSED_KEY".to_string(),
        api_base: "http://127.0.0.1:9".to_string(),
        python: "python3".to_string(),
        lint_timeout: 30,
        test_timeout: 30,
        model_timeout: 30,
        exclude_dirs: vec!["tests".to_string(), "venv".to_string()],
        prompts_dir: None,
    }
}

pub fn copy_config(target: &Path, output: &Path, log_file: &Path) -> Config {
    Config {
        output_mode: OutputMode::Copy,
        output_dir: Some(output.to_path_buf()),
        ..test_config(target, log_file)
    }
}

pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Scores every content 5.0 with one docstring diagnostic; fails for file names in `fail_for`.
#[derive(Clone, Default)]
pub struct FakeLinter {
    pub fail_for: Vec<String>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeLinter {
    pub fn failing_for(name: &str) -> Self {
        Self {
            fail_for: vec![name.to_string()],
            ..Default::default()
        }
    }
}

impl Linter for FakeLinter {
    async fn lint(&self, file: &Path, content: &str) -> Result<LintReport> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(content.to_string());
        if self.fail_for.contains(&name) {
            return Err(Error::Lint(format!("pylint unavailable for {name}")));
        }
        Ok(LintReport {
            score: Some(if content.contains("\"\"\"") { 8.0 } else { 5.0 }),
            diagnostics: vec![Diagnostic {
                line: 1,
                column: 0,
                code: "C0116".to_string(),
                symbol: Some("missing-function-docstring".to_string()),
                message: "Missing function or method docstring".to_string(),
            }],
            raw: String::new(),
        })
    }
}

/// Diagnostics-only auditor that records the judge feedback it receives.
#[derive(Clone, Default)]
pub struct FakeAuditor {
    pub feedback: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeAuditor {
    pub fn calls(&self) -> usize {
        self.feedback.lock().unwrap().len()
    }
}

impl Auditor for FakeAuditor {
    fn model_label(&self) -> &str {
        "deterministic"
    }

    fn plan(&self, request: &AuditRequest<'_>) -> Result<AuditOutput> {
        self.feedback
            .lock()
            .unwrap()
            .push(request.judge_feedback.map(str::to_string));
        let plan = RefactorPlan::from_diagnostics(
            request.report,
            request.content,
            request.judge_feedback.map(str::to_string),
        );
        Ok(AuditOutput {
            trace: StageTrace {
                input: request.report.render_diagnostics(),
                output: plan.render(),
            },
            plan,
        })
    }
}

/// Applies a fixed text substitution; `fail` makes every call an error.
#[derive(Clone)]
pub struct FakeFixer {
    pub from: String,
    pub to: String,
    pub fail: bool,
    pub calls: Arc<Mutex<usize>>,
}

impl FakeFixer {
    pub fn replacing(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn identity() -> Self {
        Self::replacing("", "")
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::identity()
        }
    }
}

impl Fixer for FakeFixer {
    fn model_label(&self) -> &str {
        "deterministic"
    }

    fn fix(&self, request: &FixRequest<'_>) -> Result<FixOutput> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(Error::Model("model request failed: 429".to_string()));
        }
        let content = if self.from.is_empty() {
            request.content.to_string()
        } else {
            request.content.replace(&self.from, &self.to)
        };
        Ok(FixOutput {
            content,
            trace: StageTrace::default(),
        })
    }
}

/// Returns scripted verdicts in order, repeating the last one. Records the
/// content of the file it was asked to judge at each call.
#[derive(Clone)]
pub struct FakeJudge {
    pub verdicts: Arc<Mutex<VecDeque<Verdict>>>,
    pub last: Verdict,
    pub fail: bool,
    /// When set, PASS iff the judged file contains this text, else FAIL_RETRY.
    pub pass_if: Option<String>,
    pub seen: Arc<Mutex<Vec<String>>>,
    pub roots: Arc<Mutex<Vec<PathBuf>>>,
    /// Files under the project root at each call, relative and sorted.
    pub trees: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeJudge {
    pub fn scripted(verdicts: &[Verdict]) -> Self {
        Self {
            verdicts: Arc::new(Mutex::new(verdicts.iter().copied().collect())),
            last: verdicts.last().copied().unwrap_or(Verdict::Pass),
            fail: false,
            pass_if: None,
            seen: Arc::new(Mutex::new(Vec::new())),
            roots: Arc::new(Mutex::new(Vec::new())),
            trees: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn passing_when_contains(text: &str) -> Self {
        Self {
            pass_if: Some(text.to_string()),
            ..Self::always(Verdict::FailRetry)
        }
    }

    pub fn always(verdict: Verdict) -> Self {
        Self::scripted(&[verdict])
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::always(Verdict::Pass)
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Judge for FakeJudge {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeResult> {
        let content = fs::read_to_string(request.file).unwrap_or_default();
        self.trees
            .lock()
            .unwrap()
            .push(list_files(request.project_root));
        self.roots
            .lock()
            .unwrap()
            .push(request.project_root.to_path_buf());
        self.seen.lock().unwrap().push(content.clone());
        if self.fail {
            return Err(Error::Judge("failed to spawn 'python3'".to_string()));
        }
        let verdict = match self.pass_if {
            Some(ref text) if content.contains(text.as_str()) => Verdict::Pass,
            Some(_) => Verdict::FailRetry,
            None => self
                .verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.last),
        };
        let exit_code = match verdict {
            Verdict::Pass => 0,
            Verdict::FailRetry => 1,
            Verdict::FailFatal => 4,
        };
        Ok(JudgeResult {
            verdict,
            output: format!("STDOUT:\n{verdict} (exit {exit_code})\nSTDERR:\n"),
            exit_code,
        })
    }
}

fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().to_string())
        })
        .collect();
    files.sort();
    files
}

#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub started: Arc<Mutex<Vec<String>>>,
    pub finished: Arc<Mutex<Vec<FileResult>>>,
    pub summaries: Arc<Mutex<Vec<RunSummary>>>,
}

impl ProgressReporter for RecordingReporter {
    fn run_started(&self, _root: &Path, _files: usize) {}

    fn file_started(&self, _index: usize, _total: usize, file: &TargetFile) {
        self.started.lock().unwrap().push(file.display_name());
    }

    fn file_finished(&self, result: &FileResult) {
        self.finished.lock().unwrap().push(result.clone());
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}
