//! All-or-nothing promotion of a validated artifact set.
//!
//! Promotion moves staged files into the repository, commits exactly those
//! files on a fresh `<prefix><slug>` branch and pushes it. Every exit path
//! returns the repository to the branch it started on; a failure at any step
//! also restores the destination files and deletes the branch it created.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::remote::pull_request_url;
use crate::core::spec::Specification;
use crate::core::types::ArtifactSet;
use crate::error::{PipelineError, PromotionStep};
use crate::io::git::Git;
use crate::io::staging::StagingArea;

/// What a successful promotion produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionRecord {
    pub spec_name: String,
    pub branch: String,
    pub commit: String,
    /// Repo-relative destination paths, in artifact order.
    pub paths: Vec<PathBuf>,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PromotionSettings {
    pub remote: String,
    pub branch_prefix: String,
    /// Repo-relative prefixes that may be dirty during promotion.
    pub allowed_dirty: Vec<String>,
}

pub struct PromotionManager<'a> {
    git: &'a Git,
    repo_root: &'a Path,
    settings: &'a PromotionSettings,
}

impl<'a> PromotionManager<'a> {
    pub fn new(git: &'a Git, repo_root: &'a Path, settings: &'a PromotionSettings) -> Self {
        Self {
            git,
            repo_root,
            settings,
        }
    }

    pub fn branch_name(&self, spec: &Specification) -> String {
        format!("{}{}", self.settings.branch_prefix, spec.slug())
    }

    /// Promote `artifacts` from `staging`, or roll back and fail.
    ///
    /// Errors are [`PipelineError::BranchExists`] or
    /// [`PipelineError::Promotion`], raised after rollback finished. Staging
    /// is removed either way.
    #[instrument(skip_all, fields(spec = %spec.name))]
    pub fn promote(
        &self,
        spec: &Specification,
        artifacts: &ArtifactSet,
        staging: &StagingArea,
    ) -> Result<PromotionRecord> {
        let branch = self.branch_name(spec);
        let guard = match BranchGuard::acquire(self.git) {
            Ok(guard) => guard,
            Err(err) => {
                remove_staging(staging);
                return Err(failed(PromotionStep::Preflight, &err));
            }
        };

        let mut ledger = MoveLedger::default();
        let mut branch_created = false;
        let result = (|| -> Result<PromotionRecord> {
            let allowed: Vec<&str> = self
                .settings
                .allowed_dirty
                .iter()
                .map(String::as_str)
                .collect();
            self.git
                .ensure_clean_except_prefixes(&allowed)
                .map_err(|err| failed(PromotionStep::Preflight, &err))?;
            if self
                .git
                .branch_exists(&branch)
                .map_err(|err| failed(PromotionStep::Preflight, &err))?
            {
                return Err(PipelineError::BranchExists {
                    branch: branch.clone(),
                }
                .into());
            }

            for (kind, staged) in artifacts.iter() {
                let relative = staging
                    .relative(staged)
                    .map_err(|err| failed(PromotionStep::Move, &err))?;
                ledger
                    .move_into(staged, self.repo_root, &relative)
                    .map_err(|err| failed(PromotionStep::Move, &err))?;
                debug!(kind = %kind, path = %relative.display(), "artifact moved");
            }

            self.git
                .checkout_new_branch(&branch)
                .map_err(|err| failed(PromotionStep::Branch, &err))?;
            branch_created = true;

            let commit = self
                .commit_moved(spec, &ledger)
                .map_err(|err| failed(PromotionStep::Commit, &err))?;

            let url = self
                .git
                .remote_url(&self.settings.remote)
                .map(|remote| pull_request_url(&remote, &branch))
                .map_err(|err| failed(PromotionStep::Push, &err))?;
            self.git
                .push(&self.settings.remote, &branch)
                .map_err(|err| failed(PromotionStep::Push, &err))?;

            Ok(PromotionRecord {
                spec_name: spec.name.clone(),
                branch: branch.clone(),
                commit,
                paths: ledger.relative_paths(),
                url,
            })
        })();

        match result {
            Ok(record) => {
                if let Err(err) = guard.release() {
                    warn!(err = %format!("{err:#}"), "promoted but could not return to original branch");
                }
                remove_staging(staging);
                info!(branch = %record.branch, commit = %record.commit, "promoted");
                Ok(record)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "promotion failed, rolling back");
                self.rollback(guard, branch_created.then_some(branch.as_str()), &ledger);
                remove_staging(staging);
                Err(err)
            }
        }
    }

    fn commit_moved(&self, spec: &Specification, ledger: &MoveLedger) -> Result<String> {
        let paths = ledger.relative_paths();
        let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        self.git.add_paths(&refs)?;
        let message = format!("feat({}): implement {} via agent", spec.category, spec.name);
        let commit = self.git.commit(&message)?;

        let mut committed = self.git.files_in_commit(&commit)?;
        committed.sort();
        let mut expected: Vec<String> = paths.iter().map(|p| slash_path(p)).collect();
        expected.sort();
        if committed != expected {
            return Err(anyhow!(
                "commit {commit} touched {committed:?}, expected exactly {expected:?}"
            ));
        }
        Ok(commit)
    }

    /// Best-effort undo. Each step is attempted even when an earlier one fails.
    fn rollback(&self, guard: BranchGuard<'_>, created_branch: Option<&str>, ledger: &MoveLedger) {
        if created_branch.is_some()
            && let Err(err) = self.git.reset_index()
        {
            warn!(err = %format!("{err:#}"), "rollback: reset index failed");
        }
        if let Err(err) = guard.release() {
            warn!(err = %format!("{err:#}"), "rollback: restoring original branch failed");
        }
        if let Some(branch) = created_branch
            && let Err(err) = self.git.delete_branch(branch)
        {
            warn!(branch, err = %format!("{err:#}"), "rollback: deleting branch failed");
        }
        ledger.undo();
        info!("rollback complete");
    }
}

fn failed(step: PromotionStep, err: &anyhow::Error) -> anyhow::Error {
    PipelineError::promotion(step, err).into()
}

fn remove_staging(staging: &StagingArea) {
    if let Err(err) = staging.remove() {
        warn!(err = %format!("{err:#}"), "could not remove staging");
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Holds the branch that was checked out when promotion began and returns to
/// it on release or drop.
struct BranchGuard<'a> {
    git: &'a Git,
    original: String,
    armed: bool,
}

impl<'a> BranchGuard<'a> {
    /// Fails on a detached HEAD: there would be nothing to return to.
    fn acquire(git: &'a Git) -> Result<Self> {
        let original = git.current_branch()?;
        Ok(Self {
            git,
            original,
            armed: true,
        })
    }

    fn release(mut self) -> Result<()> {
        self.armed = false;
        self.restore()
    }

    fn restore(&self) -> Result<()> {
        if self.git.current_branch().ok().as_deref() == Some(self.original.as_str()) {
            return Ok(());
        }
        self.git
            .checkout_branch(&self.original)
            .with_context(|| format!("return to {}", self.original))
    }
}

impl Drop for BranchGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.restore()
        {
            warn!(branch = %self.original, err = %format!("{err:#}"), "failed to restore branch");
        }
    }
}

/// One moved file and what its destination held before.
#[derive(Debug)]
struct MovedFile {
    relative: PathBuf,
    destination: PathBuf,
    prior: Option<Vec<u8>>,
}

/// Record of destination changes, so a failed promotion can put them back.
#[derive(Debug, Default)]
struct MoveLedger {
    moved: Vec<MovedFile>,
    /// Directories this promotion created, outermost first.
    created_dirs: Vec<PathBuf>,
}

impl MoveLedger {
    fn move_into(&mut self, staged: &Path, repo_root: &Path, relative: &Path) -> Result<()> {
        let destination = repo_root.join(relative);
        let prior = match fs::read(&destination) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", destination.display()));
            }
        };
        if let Some(parent) = destination.parent() {
            self.create_dirs(parent)?;
        }
        // Record before touching the destination so undo covers a partial move.
        self.moved.push(MovedFile {
            relative: relative.to_path_buf(),
            destination: destination.clone(),
            prior,
        });
        if fs::rename(staged, &destination).is_err() {
            fs::copy(staged, &destination).with_context(|| {
                format!("copy {} to {}", staged.display(), destination.display())
            })?;
            fs::remove_file(staged).with_context(|| format!("remove {}", staged.display()))?;
        }
        Ok(())
    }

    fn create_dirs(&mut self, dir: &Path) -> Result<()> {
        let missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|ancestor| !ancestor.exists())
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
        self.created_dirs.extend(missing.into_iter().rev());
        Ok(())
    }

    fn relative_paths(&self) -> Vec<PathBuf> {
        self.moved.iter().map(|m| m.relative.clone()).collect()
    }

    /// Restore prior contents, remove new files, then remove created dirs.
    fn undo(&self) {
        for moved in self.moved.iter().rev() {
            let result = match &moved.prior {
                Some(bytes) => fs::write(&moved.destination, bytes),
                None => match fs::remove_file(&moved.destination) {
                    Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(err) = result {
                warn!(path = %moved.destination.display(), err = %err, "rollback: restore failed");
            }
        }
        for dir in self.created_dirs.iter().rev() {
            // Only empty directories go; anything else is left alone.
            if let Err(err) = fs::remove_dir(dir)
                && err.kind() != ErrorKind::NotFound
            {
                debug!(path = %dir.display(), err = %err, "rollback: directory kept");
            }
        }
    }
}
