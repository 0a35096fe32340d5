use crate::lint::{Diagnostic, LintReport};

/// Create a `Diagnostic` at column 0 with no symbol.
pub fn make_diagnostic(line: u32, code: &str, message: &str) -> Diagnostic {
    Diagnostic {
        line,
        column: 0,
        code: code.to_string(),
        symbol: None,
        message: message.to_string(),
    }
}

pub fn make_report(score: Option<f64>, diagnostics: Vec<Diagnostic>) -> LintReport {
    LintReport {
        score,
        diagnostics,
        raw: String::new(),
    }
}
