//! Stable exit codes for simloop CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments, unreadable or invalid workflow/registry files, or other errors.
pub const INVALID: i32 = 1;
/// A placeholder could not be resolved or a directive could not be staged.
pub const STAGING: i32 = 2;
