//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is the
//! application's job. [`init_tracing`] is the one-liner for binaries and
//! test suites that want to see those events.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before falling back to the default filter.
pub const FILTER_ENV: &str = "RUST_LOG";

/// Installs a global fmt subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when the variable is unset or invalid.
///
/// Returns `false` when a global subscriber was already installed, so it is
/// safe to call from every test.
///
/// ```
/// khazin_support::telemetry::init_tracing("khazin_container=debug");
/// // second call is a no-op
/// assert!(!khazin_support::telemetry::init_tracing("info"));
/// ```
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = build_filter(default_filter);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(default_filter, "Tracing subscriber installed");
    }
    installed
}

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
