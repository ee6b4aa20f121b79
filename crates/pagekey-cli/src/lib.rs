//! # pagekey-cli
//!
//! Operator tooling for a pagekey store: check how identifiers normalize,
//! run content migrations over a single file, inspect stored keys, and run
//! the reconciliation sweep by hand.
//!
//! The `pagekey` binary only parses arguments and sets up logging; the
//! commands themselves live in [`commands`].

pub mod commands;
pub mod telemetry;

pub use commands::{
    key_rows, migrate_file, normalize_ids, run_sweep, JobFailure, KeyRow, MigrateOutcome,
    SweepReport,
};
pub use telemetry::{init_tracing, LogConfig};
