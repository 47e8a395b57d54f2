//! Diagnostic tracing for patchdrop binaries.
//!
//! Outcome lines meant for humans are printed by the binaries themselves;
//! this module only configures the `tracing` subscriber.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,patchdrop=info,patchdrop_watch=info";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to info for patchdrop crates and warn elsewhere.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=patchdrop=debug patchdrop patches/incoming/fix.patch
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
