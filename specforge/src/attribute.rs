//! Map raw diagnostic text back to the staged files that caused it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::core::diagnostics::scan_locations;
use crate::core::report::{Diagnostic, ValidationReport};

/// Per-file diagnostics for one failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    /// Canonical staged path -> sorted, deduplicated diagnostics.
    pub by_file: BTreeMap<PathBuf, Vec<Diagnostic>>,
    /// Failing checks without a usable file reference.
    pub unattributed: Vec<Diagnostic>,
}

impl Attribution {
    /// Files to correct this round. Unattributed diagnostics are routed to
    /// `primary` so a failure is never dropped on the floor.
    pub fn correction_targets(&self, primary: &Path) -> BTreeMap<PathBuf, Vec<Diagnostic>> {
        let mut targets = self.by_file.clone();
        if !self.unattributed.is_empty() {
            let entry = targets.entry(primary.to_path_buf()).or_default();
            entry.extend(self.unattributed.iter().cloned());
            entry.sort();
            entry.dedup();
        }
        targets
    }
}

/// Stateless attributor scoped to one staging root.
pub struct ErrorAttributor {
    root: PathBuf,
}

impl ErrorAttributor {
    /// `staging_root` should already be canonical.
    pub fn new(staging_root: &Path) -> Self {
        Self {
            root: staging_root.to_path_buf(),
        }
    }

    /// Group each failing check's `path:line:` references by staged file.
    ///
    /// References with `..` components, or that resolve outside the staging
    /// root, or to something that is not a file, are discarded.
    pub fn attribute(&self, report: &ValidationReport) -> Attribution {
        let mut by_file: BTreeMap<PathBuf, BTreeSet<Diagnostic>> = BTreeMap::new();
        let mut unattributed = BTreeSet::new();

        for check in report.failing() {
            let mut attributed_any = false;
            for location in scan_locations(&check.output) {
                let Some(path) = self.resolve(&location.path) else {
                    continue;
                };
                attributed_any = true;
                by_file.entry(path).or_default().insert(Diagnostic {
                    check: check.name.clone(),
                    kind: check.kind,
                    line: location.line,
                    excerpt: location.excerpt,
                });
            }
            if !attributed_any {
                debug!(check = %check.name, "no file reference found");
                unattributed.insert(Diagnostic {
                    check: check.name.clone(),
                    kind: check.kind,
                    line: None,
                    excerpt: check.output.trim().to_string(),
                });
            }
        }

        Attribution {
            by_file: by_file
                .into_iter()
                .map(|(path, diags)| (path, diags.into_iter().collect()))
                .collect(),
            unattributed: unattributed.into_iter().collect(),
        }
    }

    fn resolve(&self, raw: &str) -> Option<PathBuf> {
        let token = Path::new(raw);
        if token
            .components()
            .any(|component| component == Component::ParentDir)
        {
            warn!(path = raw, "discarding reference with '..'");
            return None;
        }
        let joined = if token.is_absolute() {
            token.to_path_buf()
        } else {
            self.root.join(token)
        };
        let resolved = match joined.canonicalize() {
            Ok(resolved) => resolved,
            Err(_) => {
                debug!(path = raw, "reference does not exist in staging");
                return None;
            }
        };
        if !resolved.starts_with(&self.root) {
            warn!(path = raw, resolved = %resolved.display(), "discarding reference outside staging");
            return None;
        }
        if !resolved.is_file() {
            return None;
        }
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::report::CheckResult;
    use crate::core::types::CheckKind;

    fn report(checks: Vec<(&str, CheckKind, &str)>) -> ValidationReport {
        ValidationReport {
            attempt: 1,
            checks: checks
                .into_iter()
                .map(|(name, kind, output)| CheckResult {
                    name: name.to_string(),
                    kind,
                    passed: false,
                    output: output.to_string(),
                })
                .collect(),
        }
    }

    fn staging_with(files: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("stage");
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, "x = 1\n").expect("write");
        }
        fs::create_dir_all(&root).expect("mkdir");
        let root = root.canonicalize().expect("canonical");
        (temp, root)
    }

    #[test]
    fn groups_by_file_and_dedupes() {
        let (_temp, root) = staging_with(&["algolib/a.py", "tests/test_a.py"]);
        let out = "algolib/a.py:3:1: F401 unused\nalgolib/a.py:3:1: F401 unused\ntests/test_a.py:9: error: bad";
        let attribution = ErrorAttributor::new(&root).attribute(&report(vec![
            ("ruff", CheckKind::Lint, out),
        ]));
        assert!(attribution.unattributed.is_empty());
        assert_eq!(attribution.by_file.len(), 2);
        assert_eq!(attribution.by_file[&root.join("algolib/a.py")].len(), 1);
        assert_eq!(
            attribution.by_file[&root.join("tests/test_a.py")][0].line,
            Some(9)
        );
    }

    #[test]
    fn absolute_reference_inside_staging_is_kept() {
        let (_temp, root) = staging_with(&["algolib/a.py"]);
        let out = format!("{}:7: error: oops", root.join("algolib/a.py").display());
        let attribution =
            ErrorAttributor::new(&root).attribute(&report(vec![("mypy", CheckKind::Type, out.as_str())]));
        assert!(attribution.by_file.contains_key(&root.join("algolib/a.py")));
    }

    #[test]
    fn escaping_references_are_discarded() {
        let (temp, root) = staging_with(&["algolib/a.py"]);
        let outside = temp.path().join("secret.py");
        fs::write(&outside, "").expect("write");
        let out = format!(
            "../secret.py:1: error\n{}:2: error",
            outside.display()
        );
        let attribution =
            ErrorAttributor::new(&root).attribute(&report(vec![("mypy", CheckKind::Type, out.as_str())]));
        assert!(attribution.by_file.is_empty());
        assert_eq!(attribution.unattributed.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_staging_is_discarded() {
        let (temp, root) = staging_with(&["algolib/a.py"]);
        let outside = temp.path().join("outside.py");
        fs::write(&outside, "").expect("write");
        std::os::unix::fs::symlink(&outside, root.join("link.py")).expect("symlink");
        let attribution = ErrorAttributor::new(&root).attribute(&report(vec![(
            "ruff",
            CheckKind::Lint,
            "link.py:1:1: E1 bad",
        )]));
        assert!(attribution.by_file.is_empty());
    }

    #[test]
    fn unattributed_text_falls_back_to_primary() {
        let (_temp, root) = staging_with(&["algolib/a.py", "tests/test_a.py"]);
        let primary = root.join("algolib/a.py");
        let attribution = ErrorAttributor::new(&root).attribute(&report(vec![
            ("pytest", CheckKind::Test, "ImportError while importing test module"),
            ("mypy", CheckKind::Type, "tests/test_a.py:2: error: bad"),
        ]));
        assert_eq!(attribution.unattributed.len(), 1);
        let targets = attribution.correction_targets(&primary);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[&primary][0].check, "pytest");
        assert_eq!(targets[&primary][0].line, None);
    }

    #[test]
    fn format_failure_is_routed_to_the_reformatted_file() {
        let (_temp, root) = staging_with(&["algolib/a.py", "tests/test_a.py"]);
        let primary = root.join("algolib/a.py");
        let attribution = ErrorAttributor::new(&root).attribute(&report(vec![(
            "ruff-format",
            CheckKind::Format,
            "Would reformat: tests/test_a.py\n1 file would be reformatted",
        )]));
        assert!(attribution.unattributed.is_empty());
        let targets = attribution.correction_targets(&primary);
        let files: Vec<&PathBuf> = targets.keys().collect();
        assert_eq!(files, vec![&root.join("tests/test_a.py")]);
        assert_eq!(targets[&root.join("tests/test_a.py")][0].line, None);
    }

    #[test]
    fn attribution_is_idempotent() {
        let (_temp, root) = staging_with(&["algolib/a.py"]);
        let r = report(vec![
            ("ruff", CheckKind::Lint, "algolib/a.py:1:1: E1\nalgolib/a.py:2:1: E2"),
            ("pytest", CheckKind::Test, "boom"),
        ]);
        let attributor = ErrorAttributor::new(&root);
        assert_eq!(attributor.attribute(&r), attributor.attribute(&r));
    }
}
