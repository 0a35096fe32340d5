//! Per-file Select → Audit → Fix → Judge loop.

use std::time::Duration;

use tracing::{info, warn};

use crate::audit::{AuditRequest, Auditor};
use crate::config::OutputMode;
use crate::discover::TargetFile;
use crate::experiment_log::{Action, ExperimentLog, ExperimentLogEntry, LogStage, Status};
use crate::fix::{FixRequest, Fixer};
use crate::judge::{Judge, JudgeRequest, Verdict};
use crate::lint::Linter;
use crate::materialize::{MaterializeKind, Materializer, Staged};
use crate::plan::RefactorPlan;
use crate::state::{FileResult, FileStatus, IterationRecord, RunState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Select,
    Audit,
    Fix,
    Judge,
    Retry,
    Advance(FileStatus),
    Abort,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Advance(_) | Stage::Abort)
    }
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Done,
    Failed(String),
    Judged(Verdict),
}

/// The transition table. `iteration` counts iterations started for the file.
pub fn next(stage: Stage, step: &Step, iteration: u32, ceiling: u32) -> Stage {
    match (stage, step) {
        (Stage::Advance(status), _) => Stage::Advance(status),
        (Stage::Abort, _) => Stage::Abort,
        (_, Step::Failed(_)) => Stage::Abort,
        (Stage::Select, Step::Done) => Stage::Audit,
        (Stage::Audit, Step::Done) => Stage::Fix,
        (Stage::Fix, Step::Done) => Stage::Judge,
        (Stage::Retry, Step::Done) => Stage::Audit,
        (Stage::Judge, Step::Judged(Verdict::Pass)) => Stage::Advance(FileStatus::Passed),
        (Stage::Judge, Step::Judged(Verdict::FailRetry)) if iteration < ceiling => Stage::Retry,
        (Stage::Judge, Step::Judged(Verdict::FailRetry)) => Stage::Advance(FileStatus::Exhausted),
        (Stage::Judge, Step::Judged(Verdict::FailFatal)) => Stage::Abort,
        _ => Stage::Abort,
    }
}

/// Per-file working set; dropped when the file reaches a terminal stage.
#[derive(Default)]
struct FileScope {
    original: String,
    /// Content audited and fixed in the current iteration.
    working: String,
    proposed: Option<String>,
    plan: Option<RefactorPlan>,
    feedback: Option<String>,
    before_score: Option<f64>,
    iteration_before: Option<f64>,
    iteration_after: Option<f64>,
    /// The current proposal as the judge sees it.
    judged: Option<Staged>,
    /// The original file on disk holds a proposal.
    staged: bool,
}

pub struct IterationController<'a, L, A, F, J> {
    pub linter: &'a L,
    pub auditor: &'a A,
    pub fixer: &'a F,
    pub judge: &'a J,
    pub materializer: &'a Materializer,
    pub log: &'a ExperimentLog,
    pub max_iterations: u32,
    pub cooldown: Duration,
}

impl<L, A, F, J> IterationController<'_, L, A, F, J>
where
    L: Linter,
    A: Auditor,
    F: Fixer,
    J: Judge,
{
    /// Drive one file to a terminal stage and return its result.
    pub async fn run(&self, file: &TargetFile, state: &mut RunState) -> FileResult {
        let name = file.display_name();
        let mut scope = FileScope::default();
        let mut stage = Stage::Select;
        let mut reason = None;

        while !stage.is_terminal() {
            let step = match stage {
                Stage::Select => self.select(file, &mut scope),
                Stage::Audit => {
                    state.iteration += 1;
                    self.audit(file, &mut scope, state.iteration).await
                }
                Stage::Fix => self.fix(file, &mut scope).await,
                Stage::Judge => self.judge(file, &mut scope, state).await,
                Stage::Retry => self.retry(file, state.iteration).await,
                Stage::Advance(_) | Stage::Abort => break,
            };

            if let Step::Failed(ref message) = step {
                warn!(file = %name, ?stage, error = %message, "file aborted");
                if matches!(stage, Stage::Audit | Stage::Fix | Stage::Judge) {
                    state.record_iteration(IterationRecord {
                        file: name.clone(),
                        iteration: state.iteration,
                        before_score: scope.iteration_before,
                        after_score: scope.iteration_after,
                        verdict: None,
                        note: message.clone(),
                    });
                }
                reason = Some(message.clone());
            }
            if step == Step::Judged(Verdict::FailFatal) {
                reason = Some("test runner could not run the tests (FAIL_FATAL)".to_string());
            }
            stage = next(stage, &step, state.iteration, self.max_iterations);
        }

        self.finish(file, scope, stage, reason, state.iteration)
    }

    fn select(&self, file: &TargetFile, scope: &mut FileScope) -> Step {
        match self.materializer.read(file) {
            Ok(content) => {
                info!(file = %file.display_name(), "selected");
                self.log.record(
                    self.log_entry(LogStage::Select, Action::Analysis, Status::Ok, file)
                        .input(&file.path.display().to_string()),
                );
                scope.working = content.clone();
                scope.original = content;
                Step::Done
            }
            Err(e) => self.fail(LogStage::Select, Action::Analysis, file, e.to_string()),
        }
    }

    async fn audit(&self, file: &TargetFile, scope: &mut FileScope, iteration: u32) -> Step {
        info!(file = %file.display_name(), iteration, "audit");
        scope.iteration_before = None;
        scope.iteration_after = None;
        scope.proposed = None;

        let report = match self.linter.lint(&file.path, &scope.working).await {
            Ok(report) => report,
            Err(e) => return self.fail(LogStage::Audit, Action::Analysis, file, e.to_string()),
        };
        if iteration == 1 {
            scope.before_score = report.score;
        }
        scope.iteration_before = report.score;

        let request = AuditRequest {
            file,
            content: &scope.working,
            report: &report,
            judge_feedback: scope.feedback.as_deref(),
        };
        match self.auditor.plan(&request) {
            Ok(out) => {
                self.log.record(
                    ExperimentLogEntry::new(
                        LogStage::Audit,
                        self.auditor.model_label(),
                        Action::Analysis,
                        Status::Ok,
                    )
                    .input(&out.trace.input)
                    .output(&out.trace.output)
                    .file(file.display_name()),
                );
                scope.plan = Some(out.plan);
                Step::Done
            }
            Err(e) => self.fail(LogStage::Audit, Action::Analysis, file, e.to_string()),
        }
    }

    async fn fix(&self, file: &TargetFile, scope: &mut FileScope) -> Step {
        info!(file = %file.display_name(), "fix");
        let Some(plan) = scope.plan.as_ref() else {
            return self.fail(LogStage::Fix, Action::Fix, file, "no plan to apply".to_string());
        };
        let request = FixRequest {
            file,
            content: &scope.working,
            plan,
            copy_mode: self.materializer.mode() == OutputMode::Copy,
        };
        let out = match self.fixer.fix(&request) {
            Ok(out) => out,
            Err(e) => return self.fail(LogStage::Fix, Action::Fix, file, e.to_string()),
        };
        self.log.record(
            ExperimentLogEntry::new(LogStage::Fix, self.fixer.model_label(), Action::Fix, Status::Ok)
                .input(&out.trace.input)
                .output(&out.trace.output)
                .file(file.display_name()),
        );

        scope.iteration_after = match self.linter.lint(&file.path, &out.content).await {
            Ok(report) => report.score,
            Err(e) => {
                warn!(file = %file.display_name(), error = %e, "could not score proposed content");
                None
            }
        };

        // Drop the previous scratch tree before building the next one.
        scope.judged = None;
        match self.materializer.stage(file, &out.content) {
            Ok(staged) => scope.judged = Some(staged),
            Err(e) => return self.fail(LogStage::Fix, Action::Write, file, e.to_string()),
        }
        scope.staged = self.materializer.mode() == OutputMode::Overwrite;
        scope.proposed = Some(out.content);
        Step::Done
    }

    async fn judge(&self, file: &TargetFile, scope: &mut FileScope, state: &mut RunState) -> Step {
        let Some(staged) = scope.judged.as_ref() else {
            return self.fail(LogStage::Judge, Action::Debug, file, "no staged revision".to_string());
        };
        let request = JudgeRequest {
            project_root: &staged.root,
            file: &staged.file,
        };
        let result = match self.judge.judge(&request).await {
            Ok(result) => result,
            Err(e) => return self.fail(LogStage::Judge, Action::Debug, file, e.to_string()),
        };
        info!(
            file = %file.display_name(),
            iteration = state.iteration,
            verdict = %result.verdict,
            "judged"
        );

        let status = match result.verdict {
            Verdict::Pass => Status::Ok,
            Verdict::FailRetry => Status::Retry,
            Verdict::FailFatal => Status::Error,
        };
        self.log.record(
            ExperimentLogEntry::new(LogStage::Judge, self.auditor.model_label(), Action::Debug, status)
                .input(&request.project_root.display().to_string())
                .output(&result.output)
                .file(file.display_name()),
        );
        state.record_iteration(IterationRecord {
            file: file.display_name(),
            iteration: state.iteration,
            before_score: scope.iteration_before,
            after_score: scope.iteration_after,
            verdict: Some(result.verdict),
            note: format!("exit code {}", result.exit_code),
        });

        if result.verdict == Verdict::FailRetry
            && let Some(ref proposed) = scope.proposed
        {
            scope.working = proposed.clone();
            scope.feedback = Some(result.output);
        }
        Step::Judged(result.verdict)
    }

    async fn retry(&self, file: &TargetFile, iteration: u32) -> Step {
        info!(
            file = %file.display_name(),
            next_iteration = iteration + 1,
            cooldown_secs = self.cooldown.as_secs(),
            "retrying"
        );
        if !self.cooldown.is_zero() {
            tokio::time::sleep(self.cooldown).await;
        }
        Step::Done
    }

    fn finish(
        &self,
        file: &TargetFile,
        scope: FileScope,
        stage: Stage,
        mut reason: Option<String>,
        iterations: u32,
    ) -> FileResult {
        let mut result = FileResult {
            file: file.display_name(),
            path: file.path.clone(),
            dest: None,
            mode: self.materializer.mode(),
            status: FileStatus::Aborted,
            reason: None,
            iterations,
            before_score: scope.before_score,
            after_score: None,
            full_fallback: false,
        };

        match stage {
            Stage::Advance(FileStatus::Passed) => {
                let proposed = scope.proposed.as_deref().unwrap_or(&scope.original);
                match self.materializer.materialize(file, &scope.original, proposed) {
                    Ok(written) => {
                        self.log.record(
                            ExperimentLogEntry::new(
                                LogStage::Materialize,
                                self.auditor.model_label(),
                                Action::Write,
                                if written.dest.is_some() { Status::Ok } else { Status::Skip },
                            )
                            .output(&format!("{:?}", written.kind))
                            .file(file.display_name()),
                        );
                        result.status = FileStatus::Passed;
                        result.dest = written.dest;
                        result.full_fallback = written.kind == MaterializeKind::FullFallback;
                        result.after_score = scope.iteration_after;
                    }
                    Err(e) => {
                        let _ = self.fail(LogStage::Materialize, Action::Write, file, e.to_string());
                        reason = Some(e.to_string());
                        self.rollback(file, &scope);
                    }
                }
            }
            Stage::Advance(_) => {
                result.status = FileStatus::Exhausted;
                let kept = self.materializer.mode() == OutputMode::Overwrite && scope.staged;
                if kept {
                    result.dest = Some(file.path.clone());
                    result.after_score = scope.iteration_after;
                } else {
                    result.after_score = scope.before_score;
                }
                reason = Some(format!(
                    "iterations exhausted, last revision {}",
                    if kept { "kept" } else { "discarded" }
                ));
                self.log.record(
                    ExperimentLogEntry::new(
                        LogStage::Materialize,
                        self.auditor.model_label(),
                        Action::Write,
                        Status::Skip,
                    )
                    .output(reason.as_deref().unwrap_or_default())
                    .file(file.display_name()),
                );
            }
            _ => self.rollback(file, &scope),
        }

        result.reason = reason;
        result
    }

    fn rollback(&self, file: &TargetFile, scope: &FileScope) {
        if scope.staged
            && let Err(e) = self.materializer.restore(file, &scope.original)
        {
            warn!(file = %file.display_name(), error = %e, "failed to restore original content");
        }
    }

    fn fail(&self, stage: LogStage, action: Action, file: &TargetFile, message: String) -> Step {
        self.log
            .record(self.log_entry(stage, action, Status::Error, file).output(&message));
        Step::Failed(message)
    }

    fn log_entry(
        &self,
        stage: LogStage,
        action: Action,
        status: Status,
        file: &TargetFile,
    ) -> ExperimentLogEntry {
        ExperimentLogEntry::new(stage, self.auditor.model_label(), action, status)
            .file(file.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(next(Stage::Select, &Step::Done, 0, 3), Stage::Audit);
        assert_eq!(next(Stage::Audit, &Step::Done, 1, 3), Stage::Fix);
        assert_eq!(next(Stage::Fix, &Step::Done, 1, 3), Stage::Judge);
        assert_eq!(
            next(Stage::Judge, &Step::Judged(Verdict::Pass), 1, 3),
            Stage::Advance(FileStatus::Passed)
        );
    }

    #[test]
    fn test_retry_until_ceiling() {
        let retry = Step::Judged(Verdict::FailRetry);
        assert_eq!(next(Stage::Judge, &retry, 1, 3), Stage::Retry);
        assert_eq!(next(Stage::Judge, &retry, 2, 3), Stage::Retry);
        assert_eq!(
            next(Stage::Judge, &retry, 3, 3),
            Stage::Advance(FileStatus::Exhausted)
        );
        assert_eq!(next(Stage::Retry, &Step::Done, 1, 3), Stage::Audit);
    }

    #[test]
    fn test_ceiling_of_one_never_retries() {
        assert_eq!(
            next(Stage::Judge, &Step::Judged(Verdict::FailRetry), 1, 1),
            Stage::Advance(FileStatus::Exhausted)
        );
    }

    #[test]
    fn test_failures_abort() {
        let failed = Step::Failed("boom".to_string());
        for stage in [Stage::Select, Stage::Audit, Stage::Fix, Stage::Judge] {
            assert_eq!(next(stage, &failed, 1, 3), Stage::Abort);
        }
        assert_eq!(
            next(Stage::Judge, &Step::Judged(Verdict::FailFatal), 1, 3),
            Stage::Abort
        );
    }

    #[test]
    fn test_terminal_stages_are_absorbing() {
        let done = Stage::Advance(FileStatus::Passed);
        assert_eq!(next(done, &Step::Done, 1, 3), done);
        assert_eq!(next(Stage::Abort, &Step::Done, 1, 3), Stage::Abort);
        assert!(done.is_terminal());
        assert!(!Stage::Retry.is_terminal());
    }

    #[test]
    fn test_unexpected_step_aborts() {
        assert_eq!(
            next(Stage::Audit, &Step::Judged(Verdict::Pass), 1, 3),
            Stage::Abort
        );
    }
}
