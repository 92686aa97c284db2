//! Shared tracing/logging setup for the tally workspace.

use tracing_subscriber::EnvFilter;

/// Initialize process-wide logging with the default filter.
///
/// Safe to call multiple times (subsequent calls are no-ops), so tests and
/// binaries can both call it unconditionally.
pub fn init() {
    init_with_default("info");
}

/// Initialize logging with an explicit fallback filter directive.
///
/// `RUST_LOG` still wins when set; `directive` is only used when it is not.
/// Output is JSON with timestamps.
pub fn init_with_default(directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
