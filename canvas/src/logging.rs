//! Diagnostic tracing for the canvas engine.
//!
//! Output goes to stderr so that stdout stays reserved for snapshot lines and
//! command results.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=canvas=debug canvas apply --session demo --calls calls.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
