//! Development-time tracing for debugging simloop.
//!
//! # What goes where
//!
//! - **Tracing (this module)**: staging, submission, and publish diagnostics
//!   on stderr, filtered by `RUST_LOG`. Not persisted.
//! - **Profiling (`io::profile`)**: `pattern_overhead.csv` and
//!   `execution_profile.csv`, written when `LoopOptions::profile_dir` is set
//!   and unaffected by `RUST_LOG`.
//! - **Registry snapshots (`io::registry_store`)**: the run's working
//!   directories, the input of `simloop plan --registry`.
//! - **stdout**: command output only (plans, problem lists, registry dumps).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=simloop=debug simloop check workflow.toml
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
