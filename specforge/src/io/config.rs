//! Pipeline configuration stored in `specforge.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::layout::{ArtifactLayout, is_plain_relative};
use crate::core::types::CheckKind;

/// Pipeline configuration (TOML).
///
/// Edited by humans; missing fields default to the values the Python
/// toolchain expects (ruff, mypy, pytest under `algolib/`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Correction rounds allowed before a specification is abandoned.
    pub max_attempts: u32,

    /// Wall-clock bound for each generation/fix call and each check process.
    pub per_call_timeout_secs: u64,

    /// Keep at most this many bytes of each child output stream.
    pub output_limit_bytes: usize,

    /// Staging root, relative to the repository.
    pub staging_dir: String,

    /// Directory holding specification YAML files, relative to the repository.
    pub specs_dir: String,

    pub remote: String,

    pub branch_prefix: String,

    /// Syntax self-check for generated source artifacts. `{file}` expands to
    /// the artifact path. Empty disables the check.
    pub syntax_check: Vec<String>,

    pub generator: GeneratorConfig,

    pub layout: ArtifactLayout,

    pub checks: Vec<CheckConfig>,
}

/// Content generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `ollama run <model>`.
    Ollama,
    /// `codex exec`, reading the last message from a temp file.
    Codex,
    /// Arbitrary argv from `generator.command`.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: Backend,
    /// Backend model name. `None` uses the backend's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// argv for the `command` backend. The prompt arrives on stdin.
    pub command: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Ollama,
            model: None,
            command: Vec::new(),
        }
    }
}

/// One validation check as a command run inside the staging directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckConfig {
    pub name: String,
    pub kind: CheckKind,
    pub command: Vec<String>,
    /// Extra environment; `{staging}` in values expands to the staging path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CheckConfig {
    fn new(name: &str, kind: CheckKind, command: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            command: command.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }
}

/// Format and lint rewrite the staged files in place; only what they cannot
/// fix is reported.
pub fn default_checks() -> Vec<CheckConfig> {
    let mut test = CheckConfig::new("pytest", CheckKind::Test, &["pytest", "-q"]);
    test.env
        .insert("PYTHONPATH".to_string(), "{staging}".to_string());
    vec![
        CheckConfig::new("ruff-format", CheckKind::Format, &["ruff", "format", "."]),
        CheckConfig::new("ruff-lint", CheckKind::Lint, &["ruff", "check", "--fix", "."]),
        CheckConfig::new("mypy", CheckKind::Type, &["mypy", "."]),
        test,
    ]
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_call_timeout_secs: 600,
            output_limit_bytes: 100_000,
            staging_dir: ".agent-tmp".to_string(),
            specs_dir: "specs".to_string(),
            remote: "origin".to_string(),
            branch_prefix: "agent/".to_string(),
            syntax_check: vec![
                "python3".to_string(),
                "-m".to_string(),
                "py_compile".to_string(),
                "{file}".to_string(),
            ],
            generator: GeneratorConfig::default(),
            layout: ArtifactLayout::default(),
            checks: default_checks(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.per_call_timeout_secs == 0 {
            return Err(anyhow!("per_call_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !is_plain_relative(Path::new(&self.staging_dir)) {
            return Err(anyhow!(
                "staging_dir must be a plain relative path, got '{}'",
                self.staging_dir
            ));
        }
        if !is_plain_relative(Path::new(&self.specs_dir)) {
            return Err(anyhow!(
                "specs_dir must be a plain relative path, got '{}'",
                self.specs_dir
            ));
        }
        if self.remote.trim().is_empty() {
            return Err(anyhow!("remote must be non-empty"));
        }
        if self.branch_prefix.trim().is_empty() || self.branch_prefix.contains(char::is_whitespace)
        {
            return Err(anyhow!("branch_prefix must be non-empty without whitespace"));
        }
        if self.generator.backend == Backend::Command
            && self
                .generator
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
        {
            return Err(anyhow!(
                "generator.command must be a non-empty array for the command backend"
            ));
        }
        self.layout.validate()?;
        if self.checks.is_empty() {
            return Err(anyhow!("at least one [[checks]] entry is required"));
        }
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(anyhow!("check name must be non-empty"));
            }
            if check
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
            {
                return Err(anyhow!("check '{}' needs a non-empty command", check.name));
            }
        }
        Ok(())
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForgeConfig::default());
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.branch_prefix, "agent/");
    }

    #[test]
    fn default_format_and_lint_fix_in_place() {
        let checks = default_checks();
        assert_eq!(checks[0].command, vec!["ruff", "format", "."]);
        assert_eq!(checks[1].command, vec!["ruff", "check", "--fix", "."]);
        assert!(checks.iter().all(|check| !check.command.contains(&"--check".to_string())));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("specforge.toml");
        let cfg = ForgeConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("specforge.toml");
        fs::write(
            &path,
            "max_attempts = 5\n\n[generator]\nbackend = \"codex\"\nmodel = \"o4-mini\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.generator.backend, Backend::Codex);
        assert_eq!(cfg.generator.model.as_deref(), Some("o4-mini"));
        assert_eq!(cfg.checks, default_checks());
    }

    #[test]
    fn checks_table_replaces_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("specforge.toml");
        fs::write(
            &path,
            "[[checks]]\nname = \"unit\"\nkind = \"test\"\ncommand = [\"pytest\"]\nenv = { PYTHONPATH = \"{staging}\" }\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.checks.len(), 1);
        assert_eq!(cfg.checks[0].kind, CheckKind::Test);
        assert_eq!(cfg.checks[0].env["PYTHONPATH"], "{staging}");
    }

    #[test]
    fn rejects_escaping_staging_dir() {
        let cfg = ForgeConfig {
            staging_dir: "../elsewhere".to_string(),
            ..ForgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn command_backend_needs_argv() {
        let mut cfg = ForgeConfig::default();
        cfg.generator.backend = Backend::Command;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("generator.command"));
        cfg.generator.command = vec!["./fake-llm".to_string()];
        cfg.validate().expect("valid");
    }

    #[test]
    fn rejects_check_without_command() {
        let mut cfg = ForgeConfig::default();
        cfg.checks[0].command.clear();
        assert!(cfg.validate().is_err());
    }
}
