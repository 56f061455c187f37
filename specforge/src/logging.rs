//! Diagnostic tracing for pipeline runs.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The per-spec
//! summary lines and the optional JSON report are product output and are
//! written independently of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; when unset, uses `default_directives` (e.g. `warn` or
/// `warn,specforge=info`). Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=specforge=debug specforge run origin/main --dry-run
/// ```
pub fn init(default_directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
