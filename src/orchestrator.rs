use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::audit::Auditor;
use crate::config::{Config, OutputMode};
use crate::controller::IterationController;
use crate::discover::{DiscoverOptions, TargetFile, discover};
use crate::error::{Error, Result};
use crate::experiment_log::{Action, ExperimentLog, ExperimentLogEntry, LogStage, Status};
use crate::fix::Fixer;
use crate::guard::PathGuard;
use crate::judge::Judge;
use crate::lint::Linter;
use crate::materialize::Materializer;
use crate::state::{FileResult, RunState, RunSummary};

/// Observer for human-facing run progress.
pub trait ProgressReporter: Send + Sync {
    fn run_started(&self, root: &Path, files: usize);
    fn file_started(&self, index: usize, total: usize, file: &TargetFile);
    fn file_finished(&self, result: &FileResult);
    fn run_finished(&self, summary: &RunSummary);
}

/// Default reporter that prints to stderr.
pub struct StderrReporter;

impl ProgressReporter for StderrReporter {
    fn run_started(&self, root: &Path, files: usize) {
        eprintln!(
            "[refactor-swarm] {files} file{} to process under {}",
            if files == 1 { "" } else { "s" },
            root.display()
        );
    }

    fn file_started(&self, index: usize, total: usize, file: &TargetFile) {
        eprintln!("[refactor-swarm] ({}/{total}) {}", index + 1, file.display_name());
    }

    fn file_finished(&self, result: &FileResult) {
        match result.reason {
            Some(ref reason) => eprintln!("[refactor-swarm] {} {}: {reason}", result.status, result.file),
            None => eprintln!("[refactor-swarm] {} {}", result.status, result.file),
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        eprintln!("[refactor-swarm] Summary:\n{}", summary.render());
    }
}

/// Check the target and output roots and build the materializer over them.
///
/// A missing target root is a configuration error. An output root that is the
/// target root or one of its ancestors is a root-level path violation.
pub fn prepare_roots(config: &Config) -> Result<Materializer> {
    if !config.target_dir.is_dir() {
        return Err(Error::ConfigValidation(format!(
            "target directory {} does not exist or is not a directory",
            config.target_dir.display()
        )));
    }
    let target = PathGuard::new(&config.target_dir)?;

    let output = match (config.output_mode, config.output_dir.as_ref()) {
        (OutputMode::Copy, Some(dir)) => {
            fs::create_dir_all(dir).map_err(|e| {
                Error::ConfigValidation(format!(
                    "failed to create output directory {}: {e}",
                    dir.display()
                ))
            })?;
            let guard = PathGuard::new(dir)?;
            if target.root().starts_with(guard.root()) {
                return Err(Error::PathViolation {
                    path: dir.clone(),
                    root: target.root().to_path_buf(),
                });
            }
            Some(guard)
        }
        (OutputMode::Copy, None) => {
            return Err(Error::ConfigValidation(
                "copy mode requires an output directory".to_string(),
            ));
        }
        (OutputMode::Overwrite, _) => None,
    };

    Materializer::new(config.output_mode, target, output)
}

pub struct RunOrchestrator<L, A, F, J, P = StderrReporter> {
    config: Config,
    linter: L,
    auditor: A,
    fixer: F,
    judge: J,
    materializer: Materializer,
    log: ExperimentLog,
    reporter: P,
}

impl<L: Linter, A: Auditor, F: Fixer, J: Judge> RunOrchestrator<L, A, F, J> {
    pub fn new(config: Config, linter: L, auditor: A, fixer: F, judge: J) -> Result<Self> {
        Self::with_reporter(config, linter, auditor, fixer, judge, StderrReporter)
    }
}

impl<L: Linter, A: Auditor, F: Fixer, J: Judge, P: ProgressReporter> RunOrchestrator<L, A, F, J, P> {
    pub fn with_reporter(
        config: Config,
        linter: L,
        auditor: A,
        fixer: F,
        judge: J,
        reporter: P,
    ) -> Result<Self> {
        let materializer = prepare_roots(&config)?;
        let log = ExperimentLog::open(&config.log_file)?;
        Ok(Self {
            config,
            linter,
            auditor,
            fixer,
            judge,
            materializer,
            log,
            reporter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Files to process, in relative-path order, after the cap.
    pub fn enumerate(&self) -> Vec<TargetFile> {
        let root = self.materializer.target_guard().root();
        let skip_path = self
            .config
            .output_dir
            .as_ref()
            .and_then(|dir| dir.canonicalize().ok())
            .filter(|dir| dir.starts_with(root));
        let mut files = discover(
            root,
            &DiscoverOptions {
                exclude_dirs: self.config.exclude_dirs.clone(),
                skip_path,
            },
        );
        if self.config.max_files > 0 {
            files.truncate(self.config.max_files);
        }
        files
    }

    /// Enumerate and process every file. Zero files is `Error::NoFilesFound`.
    pub async fn run(&self) -> Result<RunSummary> {
        let root = self.materializer.target_guard().root().to_path_buf();
        self.log.record(
            ExperimentLogEntry::new(
                LogStage::RunStart,
                self.auditor.model_label(),
                Action::Startup,
                Status::Ok,
            )
            .input(&root.display().to_string())
            .output(&format!(
                "mode={} max_iterations={} max_files={}",
                self.config.output_mode, self.config.max_iterations, self.config.max_files
            )),
        );

        let files = self.enumerate();
        if files.is_empty() {
            warn!(root = %root.display(), "no python files found");
            self.log.record(
                ExperimentLogEntry::new(
                    LogStage::RunEnd,
                    self.auditor.model_label(),
                    Action::Shutdown,
                    Status::Skip,
                )
                .output("no files found"),
            );
            return Err(Error::NoFilesFound(root));
        }

        Ok(self.run_files(&files).await)
    }

    /// Process `files` in order. File-scoped failures never stop the run.
    pub async fn run_files(&self, files: &[TargetFile]) -> RunSummary {
        let root = self.materializer.target_guard().root();
        info!(
            files = files.len(),
            root = %root.display(),
            log = %self.log.path().display(),
            "run started"
        );
        self.reporter.run_started(root, files.len());

        let mut state = RunState::new();
        for (index, file) in files.iter().enumerate() {
            state.begin_file(index);
            self.reporter.file_started(index, files.len(), file);

            let controller = IterationController {
                linter: &self.linter,
                auditor: &self.auditor,
                fixer: &self.fixer,
                judge: &self.judge,
                materializer: &self.materializer,
                log: &self.log,
                max_iterations: self.config.max_iterations,
                cooldown: self.config.cooldown_duration(),
            };
            let result = controller.run(file, &mut state).await;
            info!(file = %result.file, status = %result.status, "file finished");
            self.reporter.file_finished(&result);
            state.finish_file(result);
        }

        let summary = state.summary();
        self.log.record(
            ExperimentLogEntry::new(
                LogStage::RunEnd,
                self.auditor.model_label(),
                Action::Shutdown,
                Status::Ok,
            )
            .output(&summary.render()),
        );
        if let Some(ref path) = self.config.report
            && let Err(e) = summary.save_toml(path)
        {
            warn!(path = %path.display(), error = %e, "failed to save run report");
        }
        self.reporter.run_finished(&summary);
        summary
    }
}
