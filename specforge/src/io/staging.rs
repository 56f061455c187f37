//! Per-specification staging directory under `<repo>/<staging_dir>/<slug>`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

/// Exclusively owned scratch tree for one specification.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    /// Repo-relative form of `root`, e.g. `.agent-tmp/bubble_sort`.
    relative: PathBuf,
}

impl StagingArea {
    /// Create a fresh staging directory, removing any stale one first.
    pub fn create(repo_root: &Path, staging_dir: &str, slug: &str) -> Result<Self> {
        let relative = Path::new(staging_dir).join(slug);
        let root = repo_root.join(&relative);
        if root.exists() {
            warn!(path = %root.display(), "removing stale staging directory");
            fs::remove_dir_all(&root)
                .with_context(|| format!("remove stale staging {}", root.display()))?;
        }
        fs::create_dir_all(&root).with_context(|| format!("create staging {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve staging {}", root.display()))?;
        debug!(path = %root.display(), "staging created");
        Ok(Self {
            root,
            relative,
        })
    }

    /// Canonical absolute path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_root(&self) -> &Path {
        &self.relative
    }

    /// Path of `abs` relative to the staging root.
    pub fn relative(&self, abs: &Path) -> Result<PathBuf> {
        abs.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                anyhow!(
                    "{} is not inside staging {}",
                    abs.display(),
                    self.root.display()
                )
            })
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Delete the directory tree. Missing is fine.
    pub fn remove(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("remove staging {}", self.root.display()))?;
        debug!(path = %self.root.display(), "staging removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_replaces_stale_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stale = temp.path().join(".agent-tmp/quick_sort/leftover.py");
        fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
        fs::write(&stale, "old").expect("write");

        let staging = StagingArea::create(temp.path(), ".agent-tmp", "quick_sort").expect("create");
        assert!(staging.exists());
        assert!(!stale.exists());
        assert_eq!(staging.relative_root(), Path::new(".agent-tmp/quick_sort"));
    }

    #[test]
    fn relative_strips_root_and_rejects_outside() {
        let temp = tempfile::tempdir().expect("tempdir");
        let staging = StagingArea::create(temp.path(), ".agent-tmp", "x").expect("create");
        let inner = staging.root().join("algolib/x.py");
        assert_eq!(
            staging.relative(&inner).expect("relative"),
            PathBuf::from("algolib/x.py")
        );
        assert!(staging.relative(temp.path()).is_err());
    }

    #[test]
    fn remove_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let staging = StagingArea::create(temp.path(), ".agent-tmp", "x").expect("create");
        staging.remove().expect("remove");
        staging.remove().expect("remove again");
        assert!(!staging.exists());
    }
}
