//! Per-specification orchestration: generate, validate, correct, promote.
//!
//! Specifications run strictly one at a time. Each one ends in exactly one
//! [`SpecOutcome`]; a failure in one never stops the next.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{info, info_span, instrument, warn};

use crate::attribute::ErrorAttributor;
use crate::core::lifecycle::{Lifecycle, PipelineState};
use crate::core::spec::Specification;
use crate::correct::CorrectionAgent;
use crate::error::PipelineError;
use crate::generate::{ArtifactGenerator, GeneratorSettings};
use crate::io::config::ForgeConfig;
use crate::io::git::Git;
use crate::io::service::ContentService;
use crate::io::spec_source::load_spec;
use crate::io::staging::StagingArea;
use crate::promote::{PromotionManager, PromotionRecord, PromotionSettings};
use crate::validate::ValidationHarness;

const HEADLINE_CHARS: usize = 200;

/// Why a specification was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbandonReason {
    Generation {
        error: String,
    },
    RetriesExhausted {
        attempts: u32,
        last_diagnostic: String,
    },
    Promotion {
        error: String,
    },
    /// Staging could not be prepared, or the state machine was misused.
    Internal {
        error: String,
    },
}

impl AbandonReason {
    fn describe(&self) -> String {
        match self {
            AbandonReason::Generation { error } => format!("generation failed: {error}"),
            AbandonReason::RetriesExhausted {
                attempts,
                last_diagnostic,
            } => format!("still failing after {attempts} correction attempts: {last_diagnostic}"),
            AbandonReason::Promotion { error } => error.clone(),
            AbandonReason::Internal { error } => format!("internal error: {error}"),
        }
    }
}

/// Terminal result for one specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecOutcome {
    Promoted {
        record: PromotionRecord,
    },
    /// Dry run passed validation; staging kept for inspection.
    Inspected {
        staging: PathBuf,
    },
    Abandoned {
        reason: AbandonReason,
        /// Set when staging was preserved (dry run).
        staging: Option<PathBuf>,
    },
    Skipped {
        error: String,
    },
}

/// Everything observed while processing one specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecRun {
    pub source: Option<PathBuf>,
    /// Empty when the specification could not be loaded.
    pub name: String,
    pub slug: String,
    pub outcome: SpecOutcome,
    pub trace: Vec<PipelineState>,
    pub validations: u32,
    pub correction_rounds: u32,
    pub files_fixed: u32,
    pub fix_failures: u32,
}

impl SpecRun {
    fn skipped(source: &Path, err: &PipelineError) -> Self {
        Self {
            source: Some(source.to_path_buf()),
            name: String::new(),
            slug: String::new(),
            outcome: SpecOutcome::Skipped {
                error: err.to_string(),
            },
            trace: Vec::new(),
            validations: 0,
            correction_rounds: 0,
            files_fixed: 0,
            fix_failures: 0,
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self.outcome, SpecOutcome::Promoted { .. })
    }

    /// Whether this run counts against the process exit status.
    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            SpecOutcome::Promoted { .. } | SpecOutcome::Inspected { .. } => false,
            SpecOutcome::Abandoned { .. } | SpecOutcome::Skipped { .. } => true,
        }
    }

    /// One user-facing line.
    pub fn summary_line(&self) -> String {
        match &self.outcome {
            SpecOutcome::Promoted { record } => {
                format!("promoted  {} -> {}", self.name, record.url)
            }
            SpecOutcome::Inspected { staging } => {
                format!("inspected {} (passing): {}", self.name, staging.display())
            }
            SpecOutcome::Abandoned { reason, .. } => {
                format!("abandoned {}: {}", self.name, reason.describe())
            }
            SpecOutcome::Skipped { error } => {
                let source = self
                    .source
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                format!("skipped   {source}: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub runs: Vec<SpecRun>,
}

impl RunSummary {
    pub fn promoted(&self) -> usize {
        self.runs.iter().filter(|run| run.is_promoted()).count()
    }

    pub fn failures(&self) -> usize {
        self.runs.iter().filter(|run| run.is_failure()).count()
    }
}

/// Counters threaded through one specification's processing.
#[derive(Debug, Default)]
struct Tally {
    validations: u32,
    files_fixed: u32,
    fix_failures: u32,
}

pub struct Orchestrator<S: ContentService> {
    repo_root: PathBuf,
    git: Git,
    service: S,
    harness: ValidationHarness,
    generator: GeneratorSettings,
    promotion: PromotionSettings,
    staging_dir: String,
    max_attempts: u32,
    dry_run: bool,
}

impl<S: ContentService> Orchestrator<S> {
    pub fn new(
        repo_root: &Path,
        cfg: &ForgeConfig,
        service: S,
        harness: ValidationHarness,
        dry_run: bool,
    ) -> Result<Self> {
        let repo_root = repo_root
            .canonicalize()
            .with_context(|| format!("resolve repository {}", repo_root.display()))?;
        Ok(Self {
            git: Git::new(&repo_root),
            repo_root,
            service,
            harness,
            generator: GeneratorSettings {
                layout: cfg.layout.clone(),
                syntax_check: cfg.syntax_check.clone(),
                timeout: cfg.per_call_timeout(),
                output_limit_bytes: cfg.output_limit_bytes,
            },
            promotion: PromotionSettings {
                remote: cfg.remote.clone(),
                branch_prefix: cfg.branch_prefix.clone(),
                allowed_dirty: vec![
                    format!("{}/", cfg.staging_dir.trim_end_matches('/')),
                    format!("{}/", cfg.specs_dir.trim_end_matches('/')),
                ],
            },
            staging_dir: cfg.staging_dir.clone(),
            max_attempts: cfg.max_attempts,
            dry_run,
        })
    }

    /// Process every file in order. Never stops early.
    pub fn run(&self, paths: &[PathBuf]) -> RunSummary {
        let mut summary = RunSummary::default();
        for path in paths {
            let run = match load_spec(path) {
                Ok(spec) => {
                    let mut run = self.process_spec(&spec);
                    run.source = Some(path.clone());
                    run
                }
                Err(err) => {
                    warn!(path = %path.display(), err = %err, "skipping specification");
                    SpecRun::skipped(path, &err)
                }
            };
            summary.runs.push(run);
        }
        info!(
            total = summary.runs.len(),
            promoted = summary.promoted(),
            failures = summary.failures(),
            "run finished"
        );
        summary
    }

    /// Drive one specification to a terminal state.
    #[instrument(skip_all, fields(spec = %spec.name))]
    pub fn process_spec(&self, spec: &Specification) -> SpecRun {
        let slug = spec.slug();
        let mut lifecycle = Lifecycle::new(self.max_attempts);
        let mut tally = Tally::default();

        let outcome = match StagingArea::create(&self.repo_root, &self.staging_dir, &slug) {
            Ok(staging) => {
                let outcome = self
                    .drive(spec, &staging, &mut lifecycle, &mut tally)
                    .unwrap_or_else(|err| {
                        lifecycle.abandon();
                        self.abandoned(
                            AbandonReason::Internal {
                                error: format!("{err:#}"),
                            },
                            &staging,
                        )
                    });
                self.cleanup(&outcome, &staging);
                outcome
            }
            Err(err) => {
                lifecycle.abandon();
                SpecOutcome::Abandoned {
                    reason: AbandonReason::Internal {
                        error: format!("{err:#}"),
                    },
                    staging: None,
                }
            }
        };

        let run = SpecRun {
            source: None,
            name: spec.name.clone(),
            slug,
            outcome,
            trace: lifecycle.trace().to_vec(),
            validations: tally.validations,
            correction_rounds: lifecycle.retry().attempts(),
            files_fixed: tally.files_fixed,
            fix_failures: tally.fix_failures,
        };
        info!(state = %lifecycle.state(), "{}", run.summary_line());
        run
    }

    fn drive(
        &self,
        spec: &Specification,
        staging: &StagingArea,
        lifecycle: &mut Lifecycle,
        tally: &mut Tally,
    ) -> Result<SpecOutcome> {
        let generator = ArtifactGenerator::new(&self.service, &self.generator, &self.repo_root);
        let artifacts = match generator.generate(spec, staging) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "generation failed");
                lifecycle.abandon();
                return Ok(self.abandoned(
                    AbandonReason::Generation {
                        error: generation_message(&err),
                    },
                    staging,
                ));
            }
        };
        if !artifacts.is_complete() {
            return Err(anyhow!("generation produced an incomplete artifact set"));
        }
        lifecycle.advance(PipelineState::Generated)?;
        let primary = artifacts
            .primary()
            .ok_or_else(|| anyhow!("primary artifact missing"))?
            .to_path_buf();

        let attributor = ErrorAttributor::new(staging.root());
        let corrector = CorrectionAgent::new(&self.service, staging);
        loop {
            lifecycle.advance(PipelineState::Validating)?;
            tally.validations += 1;
            let _span = info_span!("attempt", n = tally.validations).entered();
            let report = self.harness.validate(staging.root(), tally.validations);
            let attribution = attributor.attribute(&report);
            let headline = report.headline(HEADLINE_CHARS).unwrap_or_default();
            if lifecycle.finish_validation(report)? {
                break;
            }
            if !lifecycle.can_correct() {
                info!(attempts = lifecycle.retry().attempts(), "retry budget exhausted");
                lifecycle.abandon();
                return Ok(self.abandoned(
                    AbandonReason::RetriesExhausted {
                        attempts: lifecycle.retry().attempts(),
                        last_diagnostic: headline,
                    },
                    staging,
                ));
            }

            lifecycle.advance(PipelineState::Correcting)?;
            for (path, diagnostics) in attribution.correction_targets(&primary) {
                match corrector.fix(&path, &diagnostics) {
                    Ok(()) => tally.files_fixed += 1,
                    Err(err) => {
                        warn!(err = %format!("{err:#}"), "correction failed");
                        tally.fix_failures += 1;
                    }
                }
            }
        }

        if self.dry_run {
            lifecycle.advance(PipelineState::Done)?;
            return Ok(SpecOutcome::Inspected {
                staging: staging.root().to_path_buf(),
            });
        }

        lifecycle.advance(PipelineState::Promoting)?;
        let manager = PromotionManager::new(&self.git, &self.repo_root, &self.promotion);
        match manager.promote(spec, &artifacts, staging) {
            Ok(record) => {
                lifecycle.advance(PipelineState::Done)?;
                Ok(SpecOutcome::Promoted { record })
            }
            Err(err) => {
                lifecycle.abandon();
                Ok(SpecOutcome::Abandoned {
                    reason: AbandonReason::Promotion {
                        error: format!("{err:#}"),
                    },
                    staging: None,
                })
            }
        }
    }

    fn abandoned(&self, reason: AbandonReason, staging: &StagingArea) -> SpecOutcome {
        SpecOutcome::Abandoned {
            reason,
            staging: self.dry_run.then(|| staging.root().to_path_buf()),
        }
    }

    /// Remove staging on every terminal state, except under dry run.
    fn cleanup(&self, outcome: &SpecOutcome, staging: &StagingArea) {
        let keep = self.dry_run && !matches!(outcome, SpecOutcome::Promoted { .. });
        if keep {
            info!(path = %staging.root().display(), "staging preserved (dry run)");
            return;
        }
        if let Err(err) = staging.remove() {
            warn!(err = %format!("{err:#}"), "could not remove staging");
        }
    }
}

fn generation_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Generation { kind, reason }) => format!("{kind}: {reason}"),
        _ => format!("{err:#}"),
    }
}
