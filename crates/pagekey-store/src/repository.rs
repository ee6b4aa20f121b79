//! Self-healing page read path.

use std::sync::Arc;

use tracing::{debug, warn};

use pagekey_content::ContentPipeline;
use pagekey_core::{normalize, storage_key, Result};

use crate::backend::PageStore;

/// Normal page traffic: reads run the rolling content migrations and write
/// the result back, writes always land in the canonical slot.
pub struct PageRepository {
    store: Arc<dyn PageStore>,
    pipeline: ContentPipeline,
}

impl PageRepository {
    /// Repository using the rolling migration pipeline.
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self::with_pipeline(store, ContentPipeline::rolling())
    }

    pub fn with_pipeline(store: Arc<dyn PageStore>, pipeline: ContentPipeline) -> Self {
        Self { store, pipeline }
    }

    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    /// Read a page, migrating its content on the way out.
    ///
    /// Migrated content is written back under the key it was read from. If
    /// the pipeline fails the stored page is left alone and its original
    /// bytes are returned; a failed write-back is logged and the migrated
    /// content is still returned.
    pub async fn read_page(&self, identifier: &str) -> Result<Vec<u8>> {
        let (key, content) = self.store.read_preferring_canonical(identifier).await?;

        let migrated = match self.pipeline.apply_migrations(&content) {
            Ok(migrated) => migrated,
            Err(e) => {
                warn!(
                    identifier,
                    storage_key = %key,
                    migration = %e.migration,
                    error = %e.source,
                    "Content migration failed, serving page unmodified"
                );
                return Ok(e.into_original());
            }
        };

        if migrated != content {
            match self.store.write_raw(&key, &migrated).await {
                Ok(()) => debug!(
                    identifier,
                    storage_key = %key,
                    before = content.len(),
                    after = migrated.len(),
                    "Wrote back migrated page"
                ),
                Err(e) => warn!(
                    identifier,
                    storage_key = %key,
                    error = %e,
                    "Failed to write back migrated page"
                ),
            }
        }

        Ok(migrated)
    }

    /// Write a page under the storage key of its canonical identifier.
    pub async fn write_page(&self, identifier: &str, content: &[u8]) -> Result<String> {
        let canonical = normalize(identifier)?;
        let key = storage_key(&canonical);
        self.store.write_raw(&key, content).await?;
        Ok(key)
    }
}
