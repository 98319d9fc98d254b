//! I/O helpers for simloop commands.

pub mod backend;
pub mod profile;
pub mod registry_store;
pub mod workflow;
