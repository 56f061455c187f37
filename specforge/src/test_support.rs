//! Test-only fakes and fixtures: scripted content service, scripted checks
//! and throwaway git repositories with a bare `origin`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::report::Diagnostic;
use crate::core::spec::Specification;
use crate::core::types::{ArtifactKind, CheckKind};
use crate::io::checks::{Check, CheckOutput};
use crate::io::config::ForgeConfig;
use crate::io::git::Git;
use crate::io::service::{ContentService, FixRequest, GenerateRequest};

/// YAML for a valid specification in `category`.
pub fn spec_yaml(name: &str, category: &str) -> String {
    format!(
        "name: {name}
description: {name} over a list of integers
category: {category}
complexity:
  time_worst: O(n^2)
  time_average: O(n^2)
  time_best: O(n)
  space_worst: O(1)
parameters:
  - name: items
    type: list[int]
    description: values to sort
returns:
  type: list[int]
  description: sorted copy of items
dependencies: []
"
    )
}

pub fn bubble_sort_spec() -> Specification {
    spec_yaml_to_spec("Bubble Sort", "sorting")
}

fn spec_yaml_to_spec(name: &str, category: &str) -> Specification {
    match Specification::from_yaml(&spec_yaml(name, category)) {
        Ok(spec) => spec,
        Err(err) => panic!("fixture spec must be valid: {err:#}"),
    }
}

/// A recorded `fix` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixCall {
    pub path: PathBuf,
    pub content: String,
    pub diagnostics: Vec<Diagnostic>,
}

type Scripted = Result<String, String>;

/// Content service returning queued responses in order.
///
/// Generation responses are queued per artifact kind; fix responses share a
/// single queue. An exhausted queue is an error, not a panic, so the pipeline
/// sees it the way it would see a failing backend.
#[derive(Debug, Default)]
pub struct ScriptedService {
    generated: RefCell<BTreeMap<ArtifactKind, VecDeque<Scripted>>>,
    fixes: RefCell<VecDeque<Scripted>>,
    generate_calls: RefCell<Vec<(String, ArtifactKind)>>,
    fix_calls: RefCell<Vec<FixCall>>,
}

impl ScriptedService {
    pub fn with_generated(self, kind: ArtifactKind, response: &str) -> Self {
        self.push_generated(kind, Ok(response.to_string()));
        self
    }

    pub fn with_generation_error(self, kind: ArtifactKind, message: &str) -> Self {
        self.push_generated(kind, Err(message.to_string()));
        self
    }

    /// Queue one plausible response per kind, `times` times over.
    pub fn with_default_artifacts(self, times: usize) -> Self {
        for _ in 0..times {
            for kind in ArtifactKind::ALL {
                self.push_generated(kind, Ok(default_artifact(kind).to_string()));
            }
        }
        self
    }

    pub fn with_fix(self, response: &str) -> Self {
        self.fixes
            .borrow_mut()
            .push_back(Ok(response.to_string()));
        self
    }

    pub fn with_fix_error(self, message: &str) -> Self {
        self.fixes
            .borrow_mut()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn generate_calls(&self) -> Vec<(String, ArtifactKind)> {
        self.generate_calls.borrow().clone()
    }

    pub fn fix_calls(&self) -> Vec<FixCall> {
        self.fix_calls.borrow().clone()
    }

    /// Panic if any queued response was never consumed.
    pub fn assert_drained(&self) {
        let generated = self.generated.borrow();
        let left: Vec<_> = generated
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(kind, queue)| format!("{kind}: {}", queue.len()))
            .collect();
        assert!(left.is_empty(), "unconsumed generate responses: {left:?}");
        let fixes = self.fixes.borrow().len();
        assert_eq!(fixes, 0, "unconsumed fix responses: {fixes}");
    }

    fn push_generated(&self, kind: ArtifactKind, response: Scripted) {
        self.generated
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push_back(response);
    }
}

fn default_artifact(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Code => "def sort(items: list[int]) -> list[int]:\n    return sorted(items)\n",
        ArtifactKind::Test => "def test_sort() -> None:\n    assert True\n",
        ArtifactKind::Doc => "Algorithm\n=========\n",
        ArtifactKind::Bench => "def test_bench() -> None:\n    pass\n",
    }
}

impl ContentService for ScriptedService {
    fn generate(&self, request: &GenerateRequest<'_>) -> anyhow::Result<String> {
        self.generate_calls
            .borrow_mut()
            .push((request.spec.name.clone(), request.kind));
        let next = self
            .generated
            .borrow_mut()
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted {} response", request.kind)),
        }
    }

    fn fix(&self, request: &FixRequest<'_>) -> anyhow::Result<String> {
        self.fix_calls.borrow_mut().push(FixCall {
            path: request.path.to_path_buf(),
            content: request.content.to_string(),
            diagnostics: request.diagnostics.to_vec(),
        });
        match self.fixes.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted fix response")),
        }
    }
}

enum Step {
    Pass,
    Fail(String),
    Error(String),
}

type CheckFn = Box<dyn Fn(&Path) -> CheckOutput>;

struct CheckState {
    name: String,
    kind: CheckKind,
    steps: RefCell<Vec<Step>>,
    dynamic: Option<CheckFn>,
    runs: Cell<u32>,
}

/// Check with a scripted sequence of results; the last entry repeats.
///
/// Clones share state, so a test can keep a handle after boxing one into a
/// harness and still read `runs()`.
#[derive(Clone)]
pub struct ScriptedCheck {
    state: Rc<CheckState>,
}

impl ScriptedCheck {
    pub fn new(name: &str, kind: CheckKind) -> Self {
        Self {
            state: Rc::new(CheckState {
                name: name.to_string(),
                kind,
                steps: RefCell::new(Vec::new()),
                dynamic: None,
                runs: Cell::new(0),
            }),
        }
    }

    /// Check computed from the staging tree on every run.
    pub fn from_fn(
        name: &str,
        kind: CheckKind,
        f: impl Fn(&Path) -> CheckOutput + 'static,
    ) -> Self {
        Self {
            state: Rc::new(CheckState {
                name: name.to_string(),
                kind,
                steps: RefCell::new(Vec::new()),
                dynamic: Some(Box::new(f)),
                runs: Cell::new(0),
            }),
        }
    }

    pub fn passing(self) -> Self {
        self.state.steps.borrow_mut().push(Step::Pass);
        self
    }

    pub fn failing(self, output: &str) -> Self {
        self.state
            .steps
            .borrow_mut()
            .push(Step::Fail(output.to_string()));
        self
    }

    /// The check cannot run at all (e.g. tool missing).
    pub fn erroring(self, message: &str) -> Self {
        self.state
            .steps
            .borrow_mut()
            .push(Step::Error(message.to_string()));
        self
    }

    pub fn runs(&self) -> u32 {
        self.state.runs.get()
    }
}

impl Check for ScriptedCheck {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn kind(&self) -> CheckKind {
        self.state.kind
    }

    fn run(&self, staging: &Path) -> anyhow::Result<CheckOutput> {
        let run = self.state.runs.get();
        self.state.runs.set(run + 1);
        if let Some(f) = &self.state.dynamic {
            return Ok(f(staging));
        }
        let steps = self.state.steps.borrow();
        let Some(step) = steps.get(run as usize).or_else(|| steps.last()) else {
            return Ok(CheckOutput {
                passed: true,
                output: String::new(),
            });
        };
        match step {
            Step::Pass => Ok(CheckOutput {
                passed: true,
                output: String::new(),
            }),
            Step::Fail(output) => Ok(CheckOutput {
                passed: false,
                output: output.clone(),
            }),
            Step::Error(message) => Err(anyhow!(message.clone())),
        }
    }
}

/// A git repository in a temp dir, on `main`, with a bare `origin` remote.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
    origin: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let base = temp.path().canonicalize().context("resolve tempdir")?;
        let root = base.join("repo");
        let origin = base.join("origin.git");
        fs::create_dir_all(&root).context("create repo dir")?;

        run_git(&base, &["init", "-q", "--bare", "origin.git"])?;
        run_git(&root, &["init", "-q"])?;
        run_git(&root, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        run_git(&root, &["config", "user.email", "forge@example.com"])?;
        run_git(&root, &["config", "user.name", "Spec Forge"])?;
        run_git(&root, &["config", "commit.gpgsign", "false"])?;
        let origin_str = origin.to_string_lossy().into_owned();
        run_git(&root, &["remote", "add", "origin", &origin_str])?;

        let repo = Self {
            _temp: temp,
            root,
            origin,
        };
        repo.write("README.md", "# algolib\n")?;
        repo.write(".gitignore", "__pycache__/\n")?;
        repo.commit_all("chore: initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root)
    }

    /// Config tuned for tests: no syntax self-check.
    pub fn config(&self) -> ForgeConfig {
        ForgeConfig {
            syntax_check: Vec::new(),
            ..ForgeConfig::default()
        }
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.root.join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Write `specs/<file_name>`.
    pub fn write_spec(&self, file_name: &str, yaml: &str) -> Result<PathBuf> {
        self.write(&format!("specs/{file_name}"), yaml)
    }

    pub fn commit_all(&self, message: &str) -> Result<String> {
        run_git(&self.root, &["add", "-A"])?;
        run_git(&self.root, &["commit", "-q", "-m", message])?;
        self.git().head_sha()
    }

    /// Run git in the working repository and return stdout.
    pub fn run_git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.root, args)
    }

    /// Branch names present on `origin`.
    pub fn origin_branches(&self) -> Result<Vec<String>> {
        let out = run_git(
            &self.origin,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
        )?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<usize> {
        let out = run_git(&self.root, &["rev-list", "--count", "HEAD"])?;
        out.trim().parse().context("parse commit count")
    }

    #[cfg(unix)]
    pub fn install_hook(&self, name: &str, script: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let path = self.root.join(".git/hooks").join(name);
        fs::create_dir_all(path.parent().unwrap_or(&self.root)).context("create hooks dir")?;
        fs::write(&path, script).with_context(|| format!("write hook {}", path.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("chmod hook {}", path.display()))?;
        Ok(())
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
