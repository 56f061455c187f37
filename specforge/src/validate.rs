//! Multi-stage validation of a staging tree.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::report::{CheckResult, ValidationReport};
use crate::io::checks::{Check, build_checks};
use crate::io::config::ForgeConfig;

/// Ordered set of checks. Every check runs on every attempt; failures are
/// aggregated into one report rather than stopping at the first.
pub struct ValidationHarness {
    checks: Vec<Box<dyn Check>>,
}

impl ValidationHarness {
    /// Checks are stable-sorted by kind: format, lint, type, test.
    pub fn new(mut checks: Vec<Box<dyn Check>>) -> Self {
        checks.sort_by_key(|check| check.kind());
        Self { checks }
    }

    pub fn from_config(cfg: &ForgeConfig) -> Self {
        Self::new(build_checks(cfg))
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Run every check against `staging` and report attempt `attempt`.
    #[instrument(skip_all, fields(attempt = attempt))]
    pub fn validate(&self, staging: &Path, attempt: u32) -> ValidationReport {
        let mut report = ValidationReport::new(attempt);
        for check in &self.checks {
            debug!(check = check.name(), kind = %check.kind(), "running check");
            let (passed, output) = match check.run(staging) {
                Ok(out) => (out.passed, out.output),
                Err(err) => {
                    warn!(check = check.name(), err = %format!("{err:#}"), "check could not run");
                    (false, format!("[{} could not run] {err:#}", check.name()))
                }
            };
            report.checks.push(CheckResult {
                name: check.name().to_string(),
                kind: check.kind(),
                passed,
                output,
            });
        }
        if report.passed() {
            info!(attempt, "validation passed");
        } else {
            info!(attempt, failing = %report.failing_names(), "validation failed");
        }
        report
    }
}
