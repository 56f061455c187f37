//! Which specification files to process, and loading them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::spec::Specification;
use crate::error::PipelineError;
use crate::io::git::Git;

/// Spec files added or modified since `base`, as sorted absolute paths.
///
/// Deleted files never appear (`--diff-filter=AM`); files removed from the
/// worktree after the diff was taken are dropped too.
#[instrument(skip_all, fields(base = base, specs_dir = specs_dir))]
pub fn changed_specs(git: &Git, repo_root: &Path, specs_dir: &str, base: &str) -> Result<Vec<PathBuf>> {
    let pathspecs = vec![
        format!("{specs_dir}/*.yml"),
        format!("{specs_dir}/*.yaml"),
    ];
    let mut paths: Vec<PathBuf> = git
        .changed_files(base, &pathspecs)?
        .into_iter()
        .map(|rel| repo_root.join(rel))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    paths.dedup();
    debug!(count = paths.len(), "changed specifications");
    Ok(paths)
}

/// Read and validate one specification. Every failure is a [`PipelineError::Spec`].
pub fn load_spec(path: &Path) -> Result<Specification, PipelineError> {
    let spec_error = |reason: String| PipelineError::Spec {
        source_path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|err| spec_error(err.to_string()))?;
    Specification::from_yaml(&raw).map_err(|err| spec_error(format!("{err:#}")))
}
