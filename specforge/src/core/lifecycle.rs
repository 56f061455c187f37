//! Per-specification state machine and retry bookkeeping.
//!
//! ```text
//! Generating -> Generated -> Validating -> Passed -> Promoting -> Done
//!                                  ^          \-> Done (dry run)
//!                                  |       \-> Failed -> Correcting -+
//!                                  +-------------------------------- +
//! any non-terminal state -> Abandoned
//! ```
//!
//! `Failed -> Correcting` is only legal while the retry budget lasts.

use std::fmt;

use serde::Serialize;

use crate::core::report::ValidationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Generating,
    Generated,
    Validating,
    Passed,
    Failed,
    Correcting,
    Promoting,
    Done,
    Abandoned,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Abandoned)
    }

    fn allows(self, next: PipelineState) -> bool {
        use PipelineState as S;
        if next == S::Abandoned {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (S::Generating, S::Generated)
                | (S::Generated, S::Validating)
                | (S::Validating, S::Passed)
                | (S::Validating, S::Failed)
                | (S::Failed, S::Correcting)
                | (S::Correcting, S::Validating)
                | (S::Passed, S::Promoting)
                | (S::Passed, S::Done)
                | (S::Promoting, S::Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Generating => "generating",
            PipelineState::Generated => "generated",
            PipelineState::Validating => "validating",
            PipelineState::Passed => "passed",
            PipelineState::Failed => "failed",
            PipelineState::Correcting => "correcting",
            PipelineState::Promoting => "promoting",
            PipelineState::Done => "done",
            PipelineState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Bounded correction counter plus the latest validation report.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
    last_report: Option<ValidationReport>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            last_report: None,
        }
    }

    /// Correction rounds started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Replace (never merge) the latest report.
    pub fn record(&mut self, report: ValidationReport) {
        self.last_report = Some(report);
    }

    pub fn last_report(&self) -> Option<&ValidationReport> {
        self.last_report.as_ref()
    }
}

/// Error for a transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal pipeline transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// State machine for one specification, with a trace of visited states.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: PipelineState,
    trace: Vec<PipelineState>,
    retry: RetryState,
}

impl Lifecycle {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: PipelineState::Generating,
            trace: vec![PipelineState::Generating],
            retry: RetryState::new(max_attempts),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn trace(&self) -> &[PipelineState] {
        &self.trace
    }

    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), IllegalTransition> {
        if !self.state.allows(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        if next == PipelineState::Correcting {
            if self.retry.exhausted() {
                return Err(IllegalTransition {
                    from: self.state,
                    to: next,
                });
            }
            self.retry.attempts += 1;
        }
        self.state = next;
        self.trace.push(next);
        Ok(())
    }

    /// Record a finished validation and move to `Passed` or `Failed`.
    pub fn finish_validation(&mut self, report: ValidationReport) -> Result<bool, IllegalTransition> {
        let passed = report.passed();
        self.retry.record(report);
        self.advance(if passed {
            PipelineState::Passed
        } else {
            PipelineState::Failed
        })?;
        Ok(passed)
    }

    /// True when a failed validation may still be corrected.
    pub fn can_correct(&self) -> bool {
        self.state == PipelineState::Failed && !self.retry.exhausted()
    }

    /// Move to `Abandoned` from wherever the machine is (no-op when terminal).
    pub fn abandon(&mut self) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Abandoned;
            self.trace.push(PipelineState::Abandoned);
        }
    }
}
