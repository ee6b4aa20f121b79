//! # pagekey-sweep
//!
//! Background reconciliation of legacy page keys.
//!
//! The rolling read path fixes a page's content but cannot move a page that
//! sits under a non-canonical storage key. The sweep does that in two steps:
//!
//! 1. [`IdentifierScanJob`] walks every stored key, works out the page's
//!    declared identifier and its canonical form, and enqueues one
//!    [`IdentifierResolveJob`] per page that needs to move.
//! 2. Each resolver moves one page to its canonical key, settling a clash
//!    with content already stored there.
//!
//! Resolvers are named after their canonical identifier, so every move
//! heading for the same destination runs on the same queue, one at a time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pagekey_sweep::dispatch_sweep;
//!
//! dispatch_sweep(store.clone(), &coordinator)?;
//! coordinator.wait_until_idle().await;
//! ```

pub mod config;
pub mod resolver;
pub mod scanner;

use std::sync::Arc;

use pagekey_jobs::{JobCoordinator, JobError};
use pagekey_store::PageStore;

pub use config::SweepConfig;
pub use resolver::{IdentifierResolveJob, Resolution};
pub use scanner::{declared_identifier, IdentifierScanJob, ScanSummary};

/// Enqueue a full scan on the coordinator.
pub fn dispatch_sweep(store: Arc<dyn PageStore>, coordinator: &JobCoordinator) -> Result<(), JobError> {
    let scan = IdentifierScanJob::new(store, coordinator.clone());
    coordinator.enqueue_job(Arc::new(scan))
}
