//! Pipeline error taxonomy.
//!
//! These errors travel inside `anyhow::Error` and are recovered with
//! `downcast_ref` where the orchestrator decides a specification's fate.
//! Validation failures are not errors: they are reports that drive the
//! correction loop.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::ArtifactKind;

/// Promotion step at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionStep {
    Preflight,
    Move,
    Branch,
    Commit,
    Push,
}

impl fmt::Display for PromotionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromotionStep::Preflight => "preflight",
            PromotionStep::Move => "move",
            PromotionStep::Branch => "branch",
            PromotionStep::Commit => "commit",
            PromotionStep::Push => "push",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input failed to parse or broke a schema rule. The spec is skipped.
    #[error("invalid specification {}: {reason}", source_path.display())]
    Spec { source_path: PathBuf, reason: String },

    /// Content generation or the syntactic self-check failed. No retries.
    #[error("generating {kind} artifact failed: {reason}")]
    Generation { kind: ArtifactKind, reason: String },

    /// The correction service returned nothing usable. Costs one attempt.
    #[error("correcting {} produced no usable content: {reason}", path.display())]
    Correction { path: PathBuf, reason: String },

    /// The promotion branch is already present; it is never reused.
    #[error("branch {branch} already exists")]
    BranchExists { branch: String },

    /// Any other promotion failure. Raised only after rollback completes.
    #[error("promotion failed at {step} step: {reason}")]
    Promotion { step: PromotionStep, reason: String },
}

impl PipelineError {
    pub fn promotion(step: PromotionStep, err: &anyhow::Error) -> Self {
        PipelineError::Promotion {
            step,
            reason: format!("{err:#}"),
        }
    }
}
