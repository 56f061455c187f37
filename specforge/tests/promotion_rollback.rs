//! Promotion failures must leave the repository exactly as it was.

use std::fs;
use std::path::PathBuf;

use specforge::core::types::{ArtifactKind, ArtifactSet, CheckKind};
use specforge::io::staging::StagingArea;
use specforge::pipeline::{AbandonReason, Orchestrator, SpecOutcome};
use specforge::promote::{PromotionManager, PromotionSettings};
use specforge::test_support::{
    ScriptedCheck, ScriptedService, TestRepo, bubble_sort_spec, spec_yaml,
};
use specforge::validate::ValidationHarness;

const DOC_PATH: &str = "docs/source/algorithms/sorting/bubble_sort.rst";
const CODE_PATH: &str = "algolib/algorithms/sorting/bubble_sort.py";

fn harness() -> ValidationHarness {
    ValidationHarness::new(vec![Box::new(
        ScriptedCheck::new("pytest", CheckKind::Test).passing(),
    )])
}

fn setup() -> (TestRepo, PathBuf) {
    let repo = TestRepo::new().expect("repo");
    repo.write(DOC_PATH, "Sorting\n=======\n").expect("doc");
    let spec = repo
        .write_spec("bubble_sort.yml", &spec_yaml("Bubble Sort", "sorting"))
        .expect("spec");
    repo.commit_all("docs: sorting index").expect("commit");
    (repo, spec)
}

fn promotion_error(outcome: &SpecOutcome) -> &str {
    match outcome {
        SpecOutcome::Abandoned {
            reason: AbandonReason::Promotion { error },
            staging: None,
        } => error,
        other => panic!("expected promotion failure, got {other:?}"),
    }
}

fn assert_untouched(repo: &TestRepo, head: &str) {
    assert_eq!(repo.git().current_branch().expect("branch"), "main");
    assert_eq!(repo.git().head_sha().expect("head"), head);
    assert!(
        !repo
            .git()
            .branch_exists("agent/bubble_sort")
            .expect("exists")
    );
    assert_eq!(repo.read(DOC_PATH).expect("doc"), "Sorting\n=======\n");
    assert!(!repo.path().join(CODE_PATH).exists());
    assert!(!repo.path().join("algolib").exists());
    assert!(!repo.path().join(".agent-tmp/bubble_sort").exists());
    assert!(
        repo.git().status_porcelain().expect("status").is_empty(),
        "worktree should be clean"
    );
}

#[test]
fn promoted_doc_extends_existing_document() {
    let (repo, spec) = setup();
    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");

    let summary = orchestrator.run(&[spec]);
    assert!(summary.runs[0].is_promoted(), "{:?}", summary.runs[0].outcome);
    let doc = repo
        .run_git(&["show", &format!("agent/bubble_sort:{DOC_PATH}")])
        .expect("show");
    assert_eq!(doc, "Sorting\n=======\n\nAlgorithm\n=========\n");
    // `main` keeps its own copy.
    assert_eq!(repo.read(DOC_PATH).expect("doc"), "Sorting\n=======\n");
}

#[test]
fn push_failure_rolls_back_everything() {
    let (repo, spec) = setup();
    let head = repo.git().head_sha().expect("head");
    let missing = repo.path().join("../does-not-exist.git");
    repo.run_git(&["remote", "set-url", "origin", &missing.to_string_lossy()])
        .expect("set-url");

    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");
    let summary = orchestrator.run(&[spec]);

    let error = promotion_error(&summary.runs[0].outcome);
    assert!(error.contains("promotion failed at push step"), "{error}");
    assert_untouched(&repo, &head);
    assert!(repo.origin_branches().expect("origin").is_empty());
}

#[cfg(unix)]
#[test]
fn commit_failure_rolls_back_everything() {
    let (repo, spec) = setup();
    let head = repo.git().head_sha().expect("head");
    repo.install_hook("pre-commit", "#!/bin/sh\necho 'rejected by hook' >&2\nexit 1\n")
        .expect("hook");

    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");
    let summary = orchestrator.run(&[spec]);

    let error = promotion_error(&summary.runs[0].outcome);
    assert!(error.contains("promotion failed at commit step"), "{error}");
    assert!(error.contains("rejected by hook"), "{error}");
    assert_untouched(&repo, &head);
}

#[test]
fn dirty_worktree_is_refused_before_any_move() {
    let (repo, spec) = setup();
    let head = repo.git().head_sha().expect("head");
    repo.write("notes.txt", "work in progress\n").expect("write");

    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");
    let summary = orchestrator.run(&[spec]);

    let error = promotion_error(&summary.runs[0].outcome);
    assert!(error.contains("preflight"), "{error}");
    assert!(error.contains("notes.txt"), "{error}");
    assert_eq!(repo.git().head_sha().expect("head"), head);
    assert_eq!(repo.read("notes.txt").expect("notes"), "work in progress\n");
    assert!(!repo.path().join(CODE_PATH).exists());
    assert!(!repo.git().branch_exists("agent/bubble_sort").expect("exists"));
}

#[test]
fn detached_head_is_refused() {
    let (repo, spec) = setup();
    let head = repo.git().head_sha().expect("head");
    repo.run_git(&["checkout", "-q", "--detach"]).expect("detach");

    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");
    let summary = orchestrator.run(&[spec]);

    let error = promotion_error(&summary.runs[0].outcome);
    assert!(error.contains("detached HEAD"), "{error}");
    assert_eq!(repo.git().head_sha().expect("head"), head);
    assert!(!repo.git().branch_exists("agent/bubble_sort").expect("exists"));
}

#[test]
fn uncommitted_spec_files_do_not_block_promotion() {
    let repo = TestRepo::new().expect("repo");
    let spec = repo
        .write_spec("bubble_sort.yml", &spec_yaml("Bubble Sort", "sorting"))
        .expect("spec");
    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");

    let summary = orchestrator.run(&[spec]);
    let SpecOutcome::Promoted { record } = &summary.runs[0].outcome else {
        panic!("expected promotion, got {:?}", summary.runs[0].outcome);
    };
    let files = repo.git().files_in_commit(&record.commit).expect("files");
    assert_eq!(files.len(), 4);
    assert!(files.iter().all(|file| !file.starts_with("specs/")));
    assert!(repo.path().join("specs/bubble_sort.yml").exists());
}

#[test]
fn detached_head_removes_staging_before_returning() {
    let (repo, _spec) = setup();
    repo.run_git(&["checkout", "-q", "--detach"]).expect("detach");
    let staging = StagingArea::create(repo.path(), ".agent-tmp", "bubble_sort").expect("staging");
    let staged = staging.root().join(CODE_PATH);
    fs::create_dir_all(staged.parent().expect("parent")).expect("mkdir");
    fs::write(&staged, "x = 1\n").expect("write");
    let mut artifacts = ArtifactSet::default();
    artifacts.insert(ArtifactKind::Code, staged);

    let git = repo.git();
    let settings = PromotionSettings {
        remote: "origin".to_string(),
        branch_prefix: "agent/".to_string(),
        allowed_dirty: vec![".agent-tmp/".to_string()],
    };
    let err = PromotionManager::new(&git, repo.path(), &settings)
        .promote(&bubble_sort_spec(), &artifacts, &staging)
        .unwrap_err();

    assert!(format!("{err:#}").contains("detached HEAD"), "{err:#}");
    assert!(!staging.exists());
    assert!(!repo.path().join(CODE_PATH).exists());
}

#[test]
fn spec_file_with_spaces_does_not_block_promotion() {
    let repo = TestRepo::new().expect("repo");
    let spec = repo
        .write_spec("bubble sort.yml", &spec_yaml("Bubble Sort", "sorting"))
        .expect("spec");
    let service = ScriptedService::default().with_default_artifacts(1);
    let cfg = repo.config();
    let orchestrator = Orchestrator::new(repo.path(), &cfg, &service, harness(), false).expect("orch");

    let summary = orchestrator.run(&[spec]);
    assert!(summary.runs[0].is_promoted(), "{:?}", summary.runs[0].outcome);
    assert!(repo.path().join("specs/bubble sort.yml").exists());
}
