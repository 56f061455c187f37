//! Validation results and the diagnostics derived from them.

use serde::Serialize;

use crate::core::types::CheckKind;

/// Outcome of one check in one validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub kind: CheckKind,
    pub passed: bool,
    /// Captured stdout and stderr, already bounded.
    pub output: String,
}

/// Every check's result for one validation attempt (1-indexed).
///
/// A report is rebuilt from scratch per attempt; nothing carries over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub attempt: u32,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn new(attempt: u32) -> Self {
        Self {
            attempt,
            checks: Vec::new(),
        }
    }

    /// All checks passed (the artifact set is promotable).
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failing(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|check| !check.passed)
    }

    /// Comma-separated names of failing checks, e.g. `lint, type`.
    pub fn failing_names(&self) -> String {
        self.failing()
            .map(|check| check.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Short excerpt of the first failing check, for run summaries.
    pub fn headline(&self, max_chars: usize) -> Option<String> {
        let check = self.failing().next()?;
        let first_line = check
            .output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no output");
        Some(format!(
            "{}: {}",
            check.name,
            truncate_chars(first_line, max_chars)
        ))
    }
}

/// A diagnostic excerpt attributed to a staged file, or left unattributed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    pub check: String,
    pub kind: CheckKind,
    /// Line locator, when the excerpt came from a `path:line:` token.
    pub line: Option<u32>,
    pub excerpt: String,
}

impl Diagnostic {
    pub fn render(&self) -> String {
        match self.line {
            Some(line) => format!("[{}] line {}: {}", self.check, line, self.excerpt),
            None => format!("[{}] {}", self.check, self.excerpt),
        }
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, kind: CheckKind, passed: bool, output: &str) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            kind,
            passed,
            output: output.to_string(),
        }
    }

    #[test]
    fn report_passes_only_when_every_check_passes() {
        let mut report = ValidationReport::new(1);
        report.checks.push(check("format", CheckKind::Format, true, ""));
        assert!(report.passed());
        report
            .checks
            .push(check("lint", CheckKind::Lint, false, "\n  x.py:1: bad\n"));
        assert!(!report.passed());
        assert_eq!(report.failing_names(), "lint");
        assert_eq!(report.headline(80).as_deref(), Some("lint: x.py:1: bad"));
    }

    #[test]
    fn headline_is_truncated() {
        let mut report = ValidationReport::new(2);
        report
            .checks
            .push(check("test", CheckKind::Test, false, &"e".repeat(50)));
        let headline = report.headline(10).expect("headline");
        assert_eq!(headline, format!("test: {}...", "e".repeat(10)));
    }

    #[test]
    fn diagnostic_render_includes_line_when_known() {
        let diag = Diagnostic {
            check: "lint".to_string(),
            kind: CheckKind::Lint,
            line: Some(12),
            excerpt: "unused variable".to_string(),
        };
        assert_eq!(diag.render(), "[lint] line 12: unused variable");
    }
}
