//! I/O adapters used by the pipeline.

pub mod config;
pub mod ledger;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod scaffold;
pub mod snapshot;
