use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::blocks::{enclosing_block, segment};
use crate::lint::LintReport;

/// Header of plans built without a model.
pub const DETERMINISTIC_HEADER: &str =
    "LLM disabled. Apply pylint recommendations, add docstrings/tests.";

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(.+)$").expect("valid regex"));
static LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blines?\s+(\d+)").expect("valid regex"));
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([CRWEF]\d{4})\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    Diagnostics,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanItem {
    /// Function key the change applies to, when one could be identified.
    pub target: Option<String>,
    pub line: Option<u32>,
    pub code: Option<String>,
    pub rationale: String,
}

/// Remediation guidance for one file, produced by an auditor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefactorPlan {
    pub items: Vec<PlanItem>,
    pub source: PlanSource,
    /// Model reply the plan was parsed from.
    pub raw: Option<String>,
    /// Test output of the previous iteration, if it failed.
    pub judge_feedback: Option<String>,
}

impl RefactorPlan {
    /// One item per diagnostic, attributed to the enclosing function.
    pub fn from_diagnostics(
        report: &LintReport,
        content: &str,
        judge_feedback: Option<String>,
    ) -> Self {
        let blocks = segment(content).unwrap_or_else(|e| {
            debug!(error = %e, "plan targets unavailable");
            Vec::new()
        });

        let items = report
            .diagnostics
            .iter()
            .map(|d| PlanItem {
                target: enclosing_block(&blocks, d.line as usize).map(|b| b.key.clone()),
                line: Some(d.line),
                code: Some(d.code.clone()),
                rationale: match &d.symbol {
                    Some(symbol) => format!("{} ({symbol})", d.message),
                    None => d.message.clone(),
                },
            })
            .collect();

        Self {
            items,
            source: PlanSource::Diagnostics,
            raw: None,
            judge_feedback,
        }
    }

    /// Parse a model reply. Falls back to the diagnostics when the reply has no usable items.
    pub fn from_model(
        raw: String,
        report: &LintReport,
        content: &str,
        judge_feedback: Option<String>,
    ) -> Self {
        let keys: Vec<String> = segment(content)
            .map(|blocks| blocks.into_iter().map(|b| b.key).collect())
            .unwrap_or_default();

        let mut items = parse_model_plan(&raw, &keys);
        if items.is_empty() {
            items = Self::from_diagnostics(report, content, None).items;
        }

        Self {
            items,
            source: PlanSource::Model,
            raw: Some(raw),
            judge_feedback,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct function keys the plan refers to, in first-mention order.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for key in self.items.iter().filter_map(|i| i.target.as_deref()) {
            if !targets.contains(&key) {
                targets.push(key);
            }
        }
        targets
    }

    /// Plan text handed to the fixer.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.source == PlanSource::Diagnostics {
            out.push_str(DETERMINISTIC_HEADER);
            out.push('\n');
        }
        if self.items.is_empty() {
            out.push_str("- No changes required.");
            return out;
        }
        let lines: Vec<String> = self.items.iter().map(render_item).collect();
        out.push_str(&lines.join("\n"));
        out
    }
}

fn render_item(item: &PlanItem) -> String {
    let mut prefix = String::from("-");
    if let Some(ref code) = item.code {
        prefix.push_str(&format!(" [{code}]"));
    }
    if let Some(line) = item.line {
        prefix.push_str(&format!(" line {line}"));
    }
    if let Some(ref target) = item.target {
        prefix.push_str(&format!(" in `{target}`"));
    }
    if prefix == "-" {
        format!("- {}", item.rationale)
    } else {
        format!("{prefix}: {}", item.rationale)
    }
}

/// Turn bulleted model output into plan items.
///
/// A reply without bullets becomes a single item holding the whole text.
pub fn parse_model_plan(raw: &str, known_keys: &[String]) -> Vec<PlanItem> {
    let bullets: Vec<&str> = raw
        .lines()
        .filter_map(|line| BULLET_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .filter(|text| !text.is_empty())
        .collect();

    let texts = if bullets.is_empty() {
        match raw.trim() {
            "" => Vec::new(),
            whole => vec![whole],
        }
    } else {
        bullets
    };

    texts
        .into_iter()
        .map(|text| PlanItem {
            target: mentioned_key(text, known_keys),
            line: LINE_RE
                .captures(text)
                .and_then(|caps| caps[1].parse().ok()),
            code: CODE_RE.captures(text).map(|caps| caps[1].to_string()),
            rationale: text.to_string(),
        })
        .collect()
}

/// Longest known key mentioned in `text`, matched on identifier boundaries.
fn mentioned_key(text: &str, known_keys: &[String]) -> Option<String> {
    known_keys
        .iter()
        .filter(|key| {
            let bare = key.split('#').next().unwrap_or(key);
            let short = bare.rsplit('.').next().unwrap_or(bare);
            contains_identifier(text, bare) || contains_identifier(text, short)
        })
        .max_by_key(|key| key.len())
        .cloned()
}

fn contains_identifier(text: &str, ident: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(ident).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + ident.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}
