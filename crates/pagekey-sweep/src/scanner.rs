//! Finds pages stored under a non-canonical key.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use pagekey_content::string_field;
use pagekey_core::defaults::SCAN_JOB_NAME;
use pagekey_core::{identifier_from_key, normalize, same_slot, Result};
use pagekey_jobs::{Job, JobCoordinator};
use pagekey_store::PageStore;

use crate::resolver::IdentifierResolveJob;

/// Counts from one scan. Every scanned page lands in exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub pages_scanned: usize,
    /// Declared identifier is already canonical.
    pub already_canonical: usize,
    /// Declared identifier normalizes to nothing.
    pub unnormalizable: usize,
    /// Declared and canonical identifiers share a storage slot.
    pub same_slot: usize,
    /// Resolver jobs enqueued.
    pub enqueued: usize,
    /// Resolver jobs the coordinator refused.
    pub rejected: usize,
}

/// Logical identifier a stored page declares: its frontmatter `identifier`
/// field when present, else whatever the storage key decodes to.
pub fn declared_identifier(key: &str, content: &[u8]) -> String {
    string_field(content, &["identifier"]).unwrap_or_else(|| identifier_from_key(key))
}

/// Scans the whole store and enqueues one resolver per page that must move.
///
/// Itself a [`Job`], so a sweep is dispatched like any other work.
pub struct IdentifierScanJob {
    store: Arc<dyn PageStore>,
    coordinator: JobCoordinator,
}

impl IdentifierScanJob {
    pub fn new(store: Arc<dyn PageStore>, coordinator: JobCoordinator) -> Self {
        Self { store, coordinator }
    }

    /// Walk every key once. Pages are not modified here.
    pub async fn scan(&self) -> Result<ScanSummary> {
        let keys = self.store.list_keys().await?;
        let mut summary = ScanSummary::default();

        for key in keys {
            summary.pages_scanned += 1;
            trace!(storage_key = %key, "Scanning page");

            let declared = match self.store.read_raw(&key).await {
                Ok(content) => declared_identifier(&key, &content),
                Err(e) => {
                    warn!(storage_key = %key, error = %e, "Unreadable page, using key as identifier");
                    identifier_from_key(&key)
                }
            };

            let canonical = match normalize(&declared) {
                Ok(canonical) => canonical,
                Err(e) => {
                    debug!(storage_key = %key, identifier = %declared, error = %e, "Skipping unnormalizable identifier");
                    summary.unnormalizable += 1;
                    continue;
                }
            };

            if canonical == declared {
                summary.already_canonical += 1;
                continue;
            }

            if same_slot(&declared, &canonical) {
                debug!(
                    storage_key = %key,
                    identifier = %declared,
                    canonical = %canonical,
                    "Skipping identifier whose canonical form shares its storage slot"
                );
                summary.same_slot += 1;
                continue;
            }

            let resolver = IdentifierResolveJob::new(self.store.clone(), key.clone(), canonical.clone());
            match self.coordinator.enqueue_job(Arc::new(resolver)) {
                Ok(()) => {
                    debug!(storage_key = %key, canonical = %canonical, "Enqueued resolver");
                    summary.enqueued += 1;
                }
                Err(e) => {
                    warn!(storage_key = %key, canonical = %canonical, error = %e, "Resolver rejected");
                    summary.rejected += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl Job for IdentifierScanJob {
    fn name(&self) -> &str {
        SCAN_JOB_NAME
    }

    async fn execute(&self) -> Result<()> {
        let start = Instant::now();
        let summary = self.scan().await?;
        info!(
            pages_scanned = summary.pages_scanned,
            already_canonical = summary.already_canonical,
            unnormalizable = summary.unnormalizable,
            same_slot = summary.same_slot,
            enqueued = summary.enqueued,
            rejected = summary.rejected,
            duration_ms = start.elapsed().as_millis() as u64,
            "Identifier scan finished"
        );
        Ok(())
    }
}
