//! I/O adapters: filesystem, git, child processes and the content backend.

pub mod checks;
pub mod config;
pub mod git;
pub mod process;
pub mod prompt;
pub mod service;
pub mod spec_source;
pub mod staging;
