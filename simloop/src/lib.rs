//! Placeholder resolution and data staging for simulation-analysis loops.
//!
//! A loop alternates a simulation phase and an analysis phase for a fixed
//! number of iterations. Tasks declare their data movement with expressions
//! such as `$PREV_SIMULATION/traj.dcd > input.dcd`; this crate resolves those
//! placeholders against the working directories of earlier tasks and turns
//! the declarations into ordered staging descriptors. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (placeholders, registry, staging).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (workflow files, registry
//!   snapshots, profiling output, the backend seam).
//!
//! Orchestration modules ([`orchestrator`], [`plan`]) coordinate core logic
//! with I/O to implement the loop and the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
