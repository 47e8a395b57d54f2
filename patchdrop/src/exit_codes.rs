//! Stable exit codes for patchdrop binaries.

/// The patch was applied (or the watcher shut down cleanly).
pub const OK: i32 = 0;
/// The patch failed to apply, or the command could not run.
pub const FAILED: i32 = 1;
/// Invalid command line (matches clap's own usage-error code).
pub const USAGE: i32 = 2;
