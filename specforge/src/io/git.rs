//! Git adapter for the pipeline.
//!
//! Promotion mutates the repository (branch, commit, push) and must be able
//! to undo itself, so every git interaction goes through this small, explicit
//! wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Absolute path of the top of the working tree.
    pub fn toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to promote)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    ///
    /// Uses `-z` so paths come back verbatim, never quoted.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-z", "-uall"])?;
        parse_status_records(&out)
    }

    /// Ensure the worktree is clean, allowing entries with any of the given prefixes.
    #[instrument(skip_all)]
    pub fn ensure_clean_except_prefixes(&self, allowed_prefixes: &[&str]) -> Result<()> {
        let entries = self.status_porcelain()?;
        let disallowed: Vec<StatusEntry> = entries
            .into_iter()
            .filter(|entry| {
                !allowed_prefixes
                    .iter()
                    .any(|prefix| entry.path.starts_with(prefix))
            })
            .collect();
        if disallowed.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(disallowed_count = disallowed.len(), "worktree not clean");
        let mut msg = String::from("working tree not clean (disallowed changes):\n");
        for entry in disallowed {
            msg.push_str(&format!("{} {}\n", entry.code, entry.path));
        }
        Err(anyhow!(msg.trim_end().to_string()))
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Force-delete a local branch.
    #[instrument(skip_all, fields(branch))]
    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "deleting branch");
        self.run_checked(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Stage exactly the given paths.
    pub fn add_paths(&self, paths: &[&Path]) -> Result<()> {
        let mut args: Vec<String> = vec!["add".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&refs)?;
        Ok(())
    }

    /// Unstage everything (keeps worktree contents).
    pub fn reset_index(&self) -> Result<()> {
        self.run_checked(&["reset", "-q"])?;
        Ok(())
    }

    /// Commit staged changes and return the new HEAD sha.
    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Result<String> {
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        self.head_sha()
    }

    /// Paths touched by a single commit.
    pub fn files_in_commit(&self, rev: &str) -> Result<Vec<String>> {
        let out = self.run_capture(&["show", "--name-only", "--pretty=format:", rev])?;
        Ok(non_empty_lines(&out))
    }

    /// Push `branch` to `remote` under the same name.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        debug!(remote, branch, "pushing branch");
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.run_checked(&["push", remote, &refspec])?;
        Ok(())
    }

    pub fn remote_url(&self, remote: &str) -> Result<String> {
        let out = self.run_capture(&["remote", "get-url", remote])?;
        Ok(out.trim().to_string())
    }

    /// Files added or modified since `base`, limited to `pathspecs`.
    #[instrument(skip_all, fields(base))]
    pub fn changed_files(&self, base: &str, pathspecs: &[String]) -> Result<Vec<String>> {
        let mut args: Vec<&str> = vec!["diff", "--name-only", "--diff-filter=AM", base, "--"];
        args.extend(pathspecs.iter().map(String::as_str));
        let out = self.run_capture(&args)?;
        let files = non_empty_lines(&out);
        debug!(count = files.len(), "changed files");
        Ok(files)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse NUL-separated `--porcelain=v1 -z` output. A rename or copy record
/// is followed by one more record holding the source path, which is skipped.
fn parse_status_records(out: &str) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let mut records = out.split('\0').filter(|record| !record.is_empty());
    while let Some(record) = records.next() {
        let entry = parse_status_record(record)?;
        if entry.code.contains(['R', 'C']) {
            records.next();
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_status_record(record: &str) -> Result<StatusEntry> {
    match (record.get(..2), record.get(2..3), record.get(3..)) {
        (Some(code), Some(" "), Some(path)) if !path.is_empty() => Ok(StatusEntry {
            code: code.to_string(),
            path: path.to_string(),
        }),
        _ => Err(anyhow!("unexpected porcelain record: '{record}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_record() {
        let entries = parse_status_records("?? .agent-tmp/bubble_sort/x.py\0").expect("parse");
        assert_eq!(
            entries,
            vec![StatusEntry {
                code: "??".to_string(),
                path: ".agent-tmp/bubble_sort/x.py".to_string()
            }]
        );
    }

    #[test]
    fn paths_with_spaces_stay_verbatim() {
        let entries =
            parse_status_records("?? specs/my spec.yml\0 M algolib/__init__.py\0").expect("parse");
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["specs/my spec.yml", "algolib/__init__.py"]);
        assert_eq!(entries[1].code, " M");
    }

    #[test]
    fn rename_keeps_new_path_and_skips_source() {
        let entries = parse_status_records("R  new.py\0old.py\0?? x.py\0").expect("parse");
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["new.py", "x.py"]);
    }

    #[test]
    fn rejects_malformed_record() {
        assert!(parse_status_records("M\0").is_err());
    }

    #[test]
    fn blank_lines_are_dropped() {
        assert_eq!(non_empty_lines("\na.yml\n\n b.yml \n"), vec!["a.yml", "b.yml"]);
    }
}
