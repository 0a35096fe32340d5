use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

const DEFAULT_AUDIT: &str = include_str!("default_prompts/audit.md");
const DEFAULT_FIX: &str = include_str!("default_prompts/fix.md");

fn default_template(stage: &str) -> Option<&'static str> {
    match stage {
        "audit" => Some(DEFAULT_AUDIT),
        "fix" => Some(DEFAULT_FIX),
        _ => None,
    }
}

fn template_filename(stage: &str) -> String {
    format!("{stage}.md")
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPromptVars {
    pub file_name: String,
    pub content: String,
    pub diagnostics: String,
    pub judge_feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixPromptVars {
    pub file_name: String,
    pub content: String,
    pub plan: String,
    pub judge_feedback: Option<String>,
    pub copy_mode: bool,
}

/// Prompt templates with embedded defaults and user overrides.
pub struct PromptEngine {
    override_dir: Option<String>,
    engine: upon::Engine<'static>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self {
            override_dir,
            engine: upon::Engine::new(),
        }
    }

    /// Load the template for a stage.
    /// User overrides in `override_dir` take precedence over defaults.
    pub fn load_template(&self, stage: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(template_filename(stage));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        default_template(stage)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown prompt stage: {stage}")))
    }

    pub fn render_audit(&self, vars: &AuditPromptVars) -> Result<String> {
        let template = self.load_template("audit")?;
        self.render(&template, vars)
    }

    pub fn render_fix(&self, vars: &FixPromptVars) -> Result<String> {
        let template = self.load_template("fix")?;
        self.render(&template, vars)
    }

    /// Render a template source against a serializable context.
    /// Undefined variables are an error.
    pub fn render<S: Serialize>(&self, source: &str, ctx: S) -> Result<String> {
        let template = self
            .engine
            .compile(source)
            .map_err(|e| Error::Prompt(format!("failed to compile template: {e}")))?;
        template
            .render(&self.engine, ctx)
            .to_string()
            .map_err(|e| Error::Prompt(format!("failed to render template: {e}")))
    }
}
