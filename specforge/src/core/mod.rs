//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (specifications, reports, diagnostic text) and return deterministic
//! outputs suitable for tests.

pub mod diagnostics;
pub mod extract;
pub mod layout;
pub mod lifecycle;
pub mod remote;
pub mod report;
pub mod spec;
pub mod types;
