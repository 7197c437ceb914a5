//! Unattended multi-stage code generation runner.
//!
//! A run issues a fixed sequence of generation requests to a completion
//! provider, sanitizes each answer, writes it to disk, records every step in a
//! SQLite ledger and finally runs an external validation chain over the
//! generated project. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task model, sanitizer, time
//!   budget, summaries). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (ledger, provider HTTP calls,
//!   prompt files, child processes, scaffold and snapshot files).
//!
//! [`pipeline`] and [`validate`] coordinate core logic with I/O to implement
//! the CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
