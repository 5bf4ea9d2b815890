//! Stable exit codes for canvas CLI commands.

/// Command succeeded and every mutation call was applied.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/input, or persistence errors.
pub const INVALID: i32 = 1;
/// `canvas apply` finished but at least one call was rejected.
pub const REJECTED: i32 = 2;
/// `canvas validate` found invariant violations in the session document.
pub const INCONSISTENT: i32 = 3;
