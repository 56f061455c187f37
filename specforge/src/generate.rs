//! Artifact generation into a staging area.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::extract::extract_content;
use crate::core::layout::ArtifactLayout;
use crate::core::spec::Specification;
use crate::core::types::{ArtifactKind, ArtifactSet};
use crate::error::PipelineError;
use crate::io::process::run_bounded;
use crate::io::service::{ContentService, GenerateRequest};
use crate::io::staging::StagingArea;

/// Settings the generator needs besides the content service.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub layout: ArtifactLayout,
    /// argv with a `{file}` placeholder; empty disables the self-check.
    pub syntax_check: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub struct ArtifactGenerator<'a, S: ContentService> {
    service: &'a S,
    settings: &'a GeneratorSettings,
    repo_root: &'a Path,
}

impl<'a, S: ContentService> ArtifactGenerator<'a, S> {
    pub fn new(service: &'a S, settings: &'a GeneratorSettings, repo_root: &'a Path) -> Self {
        Self {
            service,
            settings,
            repo_root,
        }
    }

    /// Write all four artifacts for `spec` into `staging`.
    ///
    /// Any failure is a [`PipelineError::Generation`] for the kind that broke;
    /// artifacts written before it stay on disk for the caller to clean up.
    #[instrument(skip_all, fields(spec = %spec.name))]
    pub fn generate(&self, spec: &Specification, staging: &StagingArea) -> Result<ArtifactSet> {
        let code_path = self.settings.layout.relative_path(ArtifactKind::Code, spec);
        let mut artifacts = ArtifactSet::default();
        for kind in ArtifactKind::ALL {
            let relative = self.settings.layout.relative_path(kind, spec);
            let target = staging.root().join(&relative);
            self.generate_one(spec, kind, &relative, &code_path, &target)
                .map_err(|err| PipelineError::Generation {
                    kind,
                    reason: format!("{err:#}"),
                })?;
            info!(kind = %kind, path = %relative.display(), "artifact generated");
            artifacts.insert(kind, target);
        }
        Ok(artifacts)
    }

    fn generate_one(
        &self,
        spec: &Specification,
        kind: ArtifactKind,
        relative: &Path,
        code_path: &Path,
        target: &Path,
    ) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }

        let response = self.service.generate(&GenerateRequest {
            spec,
            kind,
            path: relative,
            code_path,
        })?;
        let content =
            extract_content(&response).ok_or_else(|| anyhow!("service returned empty content"))?;

        if kind.appends() {
            self.seed_from_repo(relative, target)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(target)
                .with_context(|| format!("open {} for append", target.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("append {}", target.display()))?;
        } else {
            fs::write(target, &content).with_context(|| format!("write {}", target.display()))?;
        }

        if kind.is_source() {
            self.syntax_check(target)?;
        }
        Ok(())
    }

    /// Copy the repository's current version of an appended artifact into
    /// staging so promotion extends it instead of replacing it.
    fn seed_from_repo(&self, relative: &Path, target: &Path) -> Result<()> {
        let existing = self.repo_root.join(relative);
        if !existing.is_file() || target.exists() {
            return Ok(());
        }
        let mut seed = fs::read_to_string(&existing)
            .with_context(|| format!("read existing {}", existing.display()))?;
        if !seed.is_empty() && !seed.ends_with('\n') {
            seed.push('\n');
        }
        if !seed.is_empty() {
            seed.push('\n');
        }
        fs::write(target, seed).with_context(|| format!("seed {}", target.display()))?;
        debug!(path = %relative.display(), "seeded from repository");
        Ok(())
    }

    fn syntax_check(&self, target: &Path) -> Result<()> {
        let Some((program, args)) = self.settings.syntax_check.split_first() else {
            return Ok(());
        };
        let file = target.to_string_lossy();
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|arg| arg.replace("{file}", &file)));
        if let Some(parent) = target.parent() {
            cmd.current_dir(parent);
        }
        let output = run_bounded(
            cmd,
            None,
            self.settings.timeout,
            self.settings.output_limit_bytes,
        )
        .context("run syntax check")?;
        if !output.success() {
            return Err(anyhow!(
                "syntax check failed for {}:\n{}",
                target.display(),
                output.combined_text("syntax").trim()
            ));
        }
        debug!(path = %target.display(), "syntax check passed");
        Ok(())
    }
}

/// Repo-relative paths of every artifact for `spec`.
pub fn planned_paths(layout: &ArtifactLayout, spec: &Specification) -> Vec<(ArtifactKind, PathBuf)> {
    ArtifactKind::ALL
        .into_iter()
        .map(|kind| (kind, layout.relative_path(kind, spec)))
        .collect()
}
