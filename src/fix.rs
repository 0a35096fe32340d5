//! Fix stage: apply a refactor plan to the working content.

use crate::audit::StageTrace;
use crate::discover::TargetFile;
use crate::error::{Error, Result};
use crate::model::{ChatClient, ModelClient, extract_code_block};
use crate::plan::RefactorPlan;
use crate::prompts::{FixPromptVars, PromptEngine};

pub struct FixRequest<'a> {
    pub file: &'a TargetFile,
    pub content: &'a str,
    pub plan: &'a RefactorPlan,
    /// Output is diffed per function; the fixer should keep function names stable.
    pub copy_mode: bool,
}

#[derive(Debug, Clone)]
pub struct FixOutput {
    pub content: String,
    pub trace: StageTrace,
}

pub trait Fixer {
    fn model_label(&self) -> &str;

    fn fix(&self, request: &FixRequest<'_>) -> Result<FixOutput>;
}

/// Deterministic fixer: proposes the working content unchanged.
pub struct PassthroughFixer;

impl Fixer for PassthroughFixer {
    fn model_label(&self) -> &str {
        "deterministic"
    }

    fn fix(&self, request: &FixRequest<'_>) -> Result<FixOutput> {
        Ok(FixOutput {
            content: request.content.to_string(),
            trace: StageTrace {
                input: request.plan.render(),
                output: "no model available; content unchanged".to_string(),
            },
        })
    }
}

pub struct ModelFixer<M> {
    prompts: PromptEngine,
    model: M,
}

impl<M: ModelClient> ModelFixer<M> {
    pub fn new(prompts: PromptEngine, model: M) -> Self {
        Self { prompts, model }
    }
}

impl<M: ModelClient> Fixer for ModelFixer<M> {
    fn model_label(&self) -> &str {
        self.model.model_id()
    }

    fn fix(&self, request: &FixRequest<'_>) -> Result<FixOutput> {
        let prompt = self.prompts.render_fix(&FixPromptVars {
            file_name: request.file.display_name(),
            content: request.content.to_string(),
            plan: request.plan.render(),
            judge_feedback: request.plan.judge_feedback.clone(),
            copy_mode: request.copy_mode,
        })?;
        let reply = self.model.complete(&prompt)?;
        let content = extract_code_block(&reply);
        if content.trim().is_empty() {
            return Err(Error::Model(format!(
                "model returned no code for {}",
                request.file.display_name()
            )));
        }
        Ok(FixOutput {
            content,
            trace: StageTrace {
                input: prompt,
                output: reply,
            },
        })
    }
}

pub enum AnyFixer {
    Passthrough(PassthroughFixer),
    Model(ModelFixer<ChatClient>),
}

impl Fixer for AnyFixer {
    fn model_label(&self) -> &str {
        match self {
            AnyFixer::Passthrough(f) => f.model_label(),
            AnyFixer::Model(f) => f.model_label(),
        }
    }

    fn fix(&self, request: &FixRequest<'_>) -> Result<FixOutput> {
        match self {
            AnyFixer::Passthrough(f) => f.fix(request),
            AnyFixer::Model(f) => f.fix(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::LintReport;
    use crate::test_helpers::{make_diagnostic, make_report};
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct EchoModel {
        reply: String,
        prompts: RefCell<Vec<String>>,
    }

    impl ModelClient for EchoModel {
        fn model_id(&self) -> &str {
            "echo"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn target() -> TargetFile {
        TargetFile {
            path: PathBuf::from("/srv/code/calc.py"),
            relative: PathBuf::from("calc.py"),
        }
    }

    const CONTENT: &str = "def add(a, b):\n    return a + b\n";

    fn plan(feedback: Option<&str>) -> RefactorPlan {
        let report = make_report(None, vec![make_diagnostic(1, "C0116", "Missing docstring")]);
        RefactorPlan::from_diagnostics(&report, CONTENT, feedback.map(str::to_string))
    }

    #[test]
    fn test_passthrough_returns_content() {
        let file = target();
        let plan = plan(None);
        let out = PassthroughFixer
            .fix(&FixRequest {
                file: &file,
                content: CONTENT,
                plan: &plan,
                copy_mode: false,
            })
            .unwrap();
        assert_eq!(out.content, CONTENT);
        assert!(out.trace.input.contains("C0116"));
    }

    #[test]
    fn test_model_fixer_extracts_code() {
        let model = EchoModel {
            reply: "Sure:\n```python\ndef add(a, b):\n    \"\"\"Sum.\"\"\"\n    return a + b\n```\n"
                .to_string(),
            prompts: RefCell::new(Vec::new()),
        };
        let fixer = ModelFixer::new(PromptEngine::new(None), model);
        let file = target();
        let plan = plan(Some("FAILED test_add"));
        let out = fixer
            .fix(&FixRequest {
                file: &file,
                content: CONTENT,
                plan: &plan,
                copy_mode: true,
            })
            .unwrap();
        assert_eq!(out.content, "def add(a, b):\n    \"\"\"Sum.\"\"\"\n    return a + b\n");

        let prompts = fixer.model.prompts.borrow();
        assert!(prompts[0].contains("FAILED test_add"));
        assert!(prompts[0].contains("do not rename functions"));
        assert!(prompts[0].contains("[C0116]"));
    }

    #[test]
    fn test_model_fixer_rejects_empty_reply() {
        let model = EchoModel {
            reply: "```python\n```".to_string(),
            prompts: RefCell::new(Vec::new()),
        };
        let fixer = ModelFixer::new(PromptEngine::new(None), model);
        let file = target();
        let plan = RefactorPlan::from_diagnostics(&LintReport::default(), CONTENT, None);
        let err = fixer
            .fix(&FixRequest {
                file: &file,
                content: CONTENT,
                plan: &plan,
                copy_mode: false,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
