//! In-place correction of staged files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::core::extract::extract_content;
use crate::core::report::Diagnostic;
use crate::error::PipelineError;
use crate::io::service::{ContentService, FixRequest};
use crate::io::staging::StagingArea;

pub struct CorrectionAgent<'a, S: ContentService> {
    service: &'a S,
    staging: &'a StagingArea,
}

impl<'a, S: ContentService> CorrectionAgent<'a, S> {
    pub fn new(service: &'a S, staging: &'a StagingArea) -> Self {
        Self { service, staging }
    }

    /// Ask the service to fix `path` and overwrite it with the result.
    ///
    /// The file is left untouched unless usable content comes back. Failures
    /// are [`PipelineError::Correction`].
    #[instrument(skip_all, fields(path = %path.display(), diagnostics = diagnostics.len()))]
    pub fn fix(&self, path: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
        let relative = self.staging.relative(path)?;
        self.try_fix(path, &relative, diagnostics).map_err(|err| {
            anyhow::Error::from(PipelineError::Correction {
                path: relative.clone(),
                reason: format!("{err:#}"),
            })
        })
    }

    fn try_fix(&self, path: &Path, relative: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
        let content =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let response = self.service.fix(&FixRequest {
            path: relative,
            content: &content,
            diagnostics,
        })?;
        let corrected =
            extract_content(&response).ok_or_else(|| anyhow!("service returned empty content"))?;
        fs::write(path, &corrected).with_context(|| format!("write {}", path.display()))?;
        info!(unchanged = corrected == content, "file corrected");
        Ok(())
    }
}
