//! Stable exit codes for `hack` CLI commands.

/// Command succeeded and no candidate was hacked.
pub const OK: i32 = 0;
/// Invalid config, manifest or arguments, or any other plumbing failure.
pub const INVALID: i32 = 1;
/// At least one candidate produced a rejected answer.
pub const HACKED: i32 = 2;
/// No candidate was hacked, but at least one run ended in an execution error.
pub const EXEC_ERROR: i32 = 3;
