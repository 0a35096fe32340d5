//! Audit stage: turn lint results (and optionally a model) into a refactor plan.

use crate::discover::TargetFile;
use crate::error::Result;
use crate::lint::LintReport;
use crate::model::{ChatClient, ModelClient};
use crate::plan::RefactorPlan;
use crate::prompts::{AuditPromptVars, PromptEngine};

/// Prompt and reply of one stage call, for the experiment log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTrace {
    pub input: String,
    pub output: String,
}

pub struct AuditRequest<'a> {
    pub file: &'a TargetFile,
    pub content: &'a str,
    pub report: &'a LintReport,
    /// Test output of the previous iteration.
    pub judge_feedback: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct AuditOutput {
    pub plan: RefactorPlan,
    pub trace: StageTrace,
}

pub trait Auditor {
    /// Model identifier, or `deterministic`.
    fn model_label(&self) -> &str;

    fn plan(&self, request: &AuditRequest<'_>) -> Result<AuditOutput>;
}

/// Plans from diagnostics alone; never calls a model.
pub struct DiagnosticAuditor;

impl Auditor for DiagnosticAuditor {
    fn model_label(&self) -> &str {
        "deterministic"
    }

    fn plan(&self, request: &AuditRequest<'_>) -> Result<AuditOutput> {
        let plan = RefactorPlan::from_diagnostics(
            request.report,
            request.content,
            request.judge_feedback.map(str::to_string),
        );
        let trace = StageTrace {
            input: request.report.render_diagnostics(),
            output: plan.render(),
        };
        Ok(AuditOutput { plan, trace })
    }
}

pub struct ModelAuditor<M> {
    prompts: PromptEngine,
    model: M,
}

impl<M: ModelClient> ModelAuditor<M> {
    pub fn new(prompts: PromptEngine, model: M) -> Self {
        Self { prompts, model }
    }
}

impl<M: ModelClient> Auditor for ModelAuditor<M> {
    fn model_label(&self) -> &str {
        self.model.model_id()
    }

    fn plan(&self, request: &AuditRequest<'_>) -> Result<AuditOutput> {
        let prompt = self.prompts.render_audit(&AuditPromptVars {
            file_name: request.file.display_name(),
            content: request.content.to_string(),
            diagnostics: request.report.render_diagnostics(),
            judge_feedback: request.judge_feedback.map(str::to_string),
        })?;
        let reply = self.model.complete(&prompt)?;
        let plan = RefactorPlan::from_model(
            reply.clone(),
            request.report,
            request.content,
            request.judge_feedback.map(str::to_string),
        );
        Ok(AuditOutput {
            plan,
            trace: StageTrace {
                input: prompt,
                output: reply,
            },
        })
    }
}

/// Auditor chosen at startup from the deterministic flag.
pub enum AnyAuditor {
    Diagnostics(DiagnosticAuditor),
    Model(ModelAuditor<ChatClient>),
}

impl Auditor for AnyAuditor {
    fn model_label(&self) -> &str {
        match self {
            AnyAuditor::Diagnostics(a) => a.model_label(),
            AnyAuditor::Model(a) => a.model_label(),
        }
    }

    fn plan(&self, request: &AuditRequest<'_>) -> Result<AuditOutput> {
        match self {
            AnyAuditor::Diagnostics(a) => a.plan(request),
            AnyAuditor::Model(a) => a.plan(request),
        }
    }
}
