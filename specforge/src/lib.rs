//! Specification-driven artifact pipeline.
//!
//! A YAML algorithm specification is turned into four artifacts (code, tests,
//! docs, benchmark) inside an isolated staging directory, validated by an
//! ordered set of external checks, corrected in a bounded retry loop, and
//! promoted onto a dedicated git branch. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (spec schema, layout, state
//!   machine, diagnostic scanning, content extraction). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, child processes, config,
//!   staging, the content backend).
//!
//! The pipeline stages ([`generate`], [`validate`], [`attribute`],
//! [`correct`], [`promote`]) combine the two, and [`pipeline`] drives them
//! per specification.

pub mod attribute;
pub mod core;
pub mod correct;
pub mod error;
pub mod exit_codes;
pub mod generate;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod promote;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
