//! Stable exit codes for `overnight` commands.

/// Command succeeded. Validation failures do not change this.
pub const OK: i32 = 0;
/// Invalid config, ledger errors or any other failure.
pub const INVALID: i32 = 1;
/// A generation task failed or the run hit its deadline.
pub const GENERATION_FAILED: i32 = 2;
/// The provider health check failed.
pub const PROVIDER_UNAVAILABLE: i32 = 3;
