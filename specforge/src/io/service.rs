//! Content service abstraction for generation and correction.
//!
//! The [`ContentService`] trait decouples the pipeline from the model backend.
//! [`CommandService`] renders a prompt and pipes it into a child process
//! (`ollama`, `codex exec` or a configured command); tests use scripted
//! services that return canned responses without spawning anything.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::report::Diagnostic;
use crate::core::spec::Specification;
use crate::core::types::ArtifactKind;
use crate::io::config::{Backend, ForgeConfig};
use crate::io::process::run_bounded;
use crate::io::prompt::PromptEngine;

const DEFAULT_OLLAMA_MODEL: &str = "openhermes:2.5-mistral";

/// Request to generate one artifact.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub spec: &'a Specification,
    pub kind: ArtifactKind,
    /// Repo-relative destination path.
    pub path: &'a Path,
    /// Repo-relative path of the primary artifact.
    pub code_path: &'a Path,
}

/// Request to correct one staged file.
#[derive(Debug, Clone)]
pub struct FixRequest<'a> {
    /// Staging-relative path.
    pub path: &'a Path,
    pub content: &'a str,
    pub diagnostics: &'a [Diagnostic],
}

/// Opaque content producer. Responses are raw; callers extract content.
pub trait ContentService {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String>;
    fn fix(&self, request: &FixRequest<'_>) -> Result<String>;
}

impl<T: ContentService + ?Sized> ContentService for &T {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        (**self).generate(request)
    }

    fn fix(&self, request: &FixRequest<'_>) -> Result<String> {
        (**self).fix(request)
    }
}

/// How the prompt reaches the backend and how the reply comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    /// Reply is the child's stdout.
    Stdout(Vec<String>),
    /// `codex exec`: reply is written to the file passed after
    /// `--output-last-message`.
    Codex { model: Option<String> },
}

/// Service that runs a backend process per request.
pub struct CommandService {
    invocation: Invocation,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl CommandService {
    pub fn from_config(cfg: &ForgeConfig, workdir: &Path) -> Result<Self> {
        let model = cfg.generator.model.clone();
        let invocation = match cfg.generator.backend {
            Backend::Ollama => Invocation::Stdout(vec![
                "ollama".to_string(),
                "run".to_string(),
                model.unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            ]),
            Backend::Codex => Invocation::Codex { model },
            Backend::Command => {
                if cfg.generator.command.is_empty() {
                    return Err(anyhow!("generator.command is empty"));
                }
                Invocation::Stdout(cfg.generator.command.clone())
            }
        };
        Ok(Self {
            invocation,
            workdir: workdir.to_path_buf(),
            timeout: cfg.per_call_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            prompts: PromptEngine::new()?,
        })
    }

    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        match &self.invocation {
            Invocation::Stdout(argv) => self.complete_stdout(argv, prompt),
            Invocation::Codex { model } => self.complete_codex(model.as_deref(), prompt),
        }
    }

    fn complete_stdout(&self, argv: &[String], prompt: &str) -> Result<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty backend command"))?;
        info!(program = %program, "requesting completion");
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let output = run_bounded(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {program}"))?;
        ensure_success(program, &output)?;
        Ok(output.stdout_text())
    }

    fn complete_codex(&self, model: Option<&str>, prompt: &str) -> Result<String> {
        info!("requesting completion from codex exec");
        let reply = tempfile::NamedTempFile::new().context("create codex reply file")?;
        let mut cmd = Command::new("codex");
        cmd.arg("exec").arg("--skip-git-repo-check");
        if let Some(model) = model {
            cmd.arg("-m").arg(model);
        }
        cmd.arg("--output-last-message")
            .arg(reply.path())
            .arg("-")
            .current_dir(&self.workdir);
        let output = run_bounded(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run codex exec")?;
        ensure_success("codex exec", &output)?;
        fs::read_to_string(reply.path())
            .with_context(|| format!("read codex reply {}", reply.path().display()))
    }
}

fn ensure_success(program: &str, output: &crate::io::process::CommandOutput) -> Result<()> {
    if output.timed_out {
        warn!(program, "backend timed out");
        return Err(anyhow!("{program} timed out"));
    }
    if !output.status.success() {
        warn!(program, exit_code = ?output.status.code(), "backend failed");
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{program} failed with status {:?}: {}",
            output.status.code(),
            stderr.trim()
        ));
    }
    if output.stdout_truncated > 0 {
        warn!(program, dropped = output.stdout_truncated, "backend reply truncated");
        return Err(anyhow!(
            "{program} reply exceeded {} bytes ({} more dropped)",
            output.stdout.len(),
            output.stdout_truncated
        ));
    }
    debug!(program, bytes = output.stdout.len(), "backend completed");
    Ok(())
}

impl ContentService for CommandService {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let prompt = self.prompts.render_generate(
            request.spec,
            request.kind,
            request.path,
            request.code_path,
        )?;
        self.complete(&prompt)
    }

    fn fix(&self, request: &FixRequest<'_>) -> Result<String> {
        let prompt = self
            .prompts
            .render_fix(request.path, request.content, request.diagnostics)?;
        self.complete(&prompt)
    }
}
