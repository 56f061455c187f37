//! Locate `path:line:` references in raw tool output.
//!
//! Formatter, linter, type-checker and test-runner output all share the
//! convention of prefixing a diagnostic with `file:line:`. Formatters in
//! check mode name whole files instead (`Would reformat: file`). Only those
//! two shapes are understood here; nothing about the artifact language is
//! parsed.

use std::sync::LazyLock;

use regex::Regex;

/// A file reference found in diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Path exactly as it appeared (unsanitized).
    pub path: String,
    /// `None` when the whole file is implicated.
    pub line: Option<u32>,
    /// The full trimmed line the reference came from.
    pub excerpt: String,
}

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s"'(\[])(?P<path>[^\s:"'()\[\]]+\.[A-Za-z0-9_]+):(?P<line>\d+):"#)
        .unwrap()
});

static REFORMAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Would reformat:\s+(?P<path>\S+)\s*$").unwrap());

/// Return every file reference in `text`, in order of appearance.
pub fn scan_locations(text: &str) -> Vec<Location> {
    let mut found = Vec::new();
    for raw_line in text.lines() {
        let excerpt = raw_line.trim();
        if excerpt.is_empty() {
            continue;
        }
        if let Some(path) = REFORMAT_RE.captures(raw_line).and_then(|caps| caps.name("path")) {
            found.push(Location {
                path: path.as_str().to_string(),
                line: None,
                excerpt: excerpt.to_string(),
            });
            continue;
        }
        for caps in LOCATION_RE.captures_iter(raw_line) {
            let Some(path) = caps.name("path") else {
                continue;
            };
            let Some(line) = caps.name("line").and_then(|m| m.as_str().parse().ok()) else {
                continue;
            };
            found.push(Location {
                path: path.as_str().to_string(),
                line: Some(line),
                excerpt: excerpt.to_string(),
            });
        }
    }
    found
}
