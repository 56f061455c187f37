//! Stable exit codes for specforge CLI commands.

/// Every processed specification was promoted (or passed, under dry run).
pub const OK: i32 = 0;
/// Invalid input, config or repository state, or any other error.
pub const INVALID: i32 = 1;
/// The run finished but at least one specification was abandoned or skipped.
pub const INCOMPLETE: i32 = 2;
