//! Validation checks run against a staging tree.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::types::CheckKind;
use crate::io::config::{CheckConfig, ForgeConfig};
use crate::io::process::run_bounded;

/// Result of running one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutput {
    pub passed: bool,
    /// Raw diagnostic text.
    pub output: String,
}

/// A single validation step (format, lint, type, test).
pub trait Check {
    fn name(&self) -> &str;
    fn kind(&self) -> CheckKind;
    /// Run against `staging`. `Err` means the check could not run at all.
    fn run(&self, staging: &Path) -> Result<CheckOutput>;
}

/// Check backed by an external tool, run with the staging root as cwd.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    config: CheckConfig,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandCheck {
    pub fn new(config: CheckConfig, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            config,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Check for CommandCheck {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> CheckKind {
        self.config.kind
    }

    #[instrument(skip_all, fields(check = %self.config.name))]
    fn run(&self, staging: &Path) -> Result<CheckOutput> {
        let staging_str = staging.to_string_lossy();
        let expand = |raw: &str| raw.replace("{staging}", &staging_str);

        let Some((program, args)) = self.config.command.split_first() else {
            anyhow::bail!("check '{}' has an empty command", self.config.name);
        };
        let mut cmd = Command::new(expand(program));
        cmd.args(args.iter().map(|arg| expand(arg)))
            .current_dir(staging);
        for (key, value) in &self.config.env {
            cmd.env(key, expand(value));
        }

        let output = run_bounded(cmd, None, self.timeout, self.output_limit_bytes)?;
        let passed = output.success();
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "check timed out");
        }
        debug!(passed, exit_code = ?output.status.code(), "check finished");
        Ok(CheckOutput {
            passed,
            output: output.combined_text(&self.config.name),
        })
    }
}

/// Build the configured checks, in configuration order.
pub fn build_checks(cfg: &ForgeConfig) -> Vec<Box<dyn Check>> {
    cfg.checks
        .iter()
        .cloned()
        .map(|check| {
            Box::new(CommandCheck::new(
                check,
                cfg.per_call_timeout(),
                cfg.output_limit_bytes,
            )) as Box<dyn Check>
        })
        .collect()
}
