//! Moves one page to its canonical key.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use pagekey_content::ContentPipeline;
use pagekey_core::{storage_key, Error, Result};
use pagekey_jobs::Job;
use pagekey_store::PageStore;

/// How a resolver settled its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing was stored under the canonical key; the legacy page moved in.
    Moved,
    /// Both keys held content and the legacy copy was larger.
    LegacyKept,
    /// Both keys held content and the canonical copy was at least as large.
    CanonicalKept,
}

/// Migrates the page under `legacy_key` to the key of `canonical`.
///
/// Queued under the canonical identifier, so resolvers racing for the same
/// destination run one after another.
pub struct IdentifierResolveJob {
    store: Arc<dyn PageStore>,
    legacy_key: String,
    canonical: String,
    pipeline: ContentPipeline,
}

impl IdentifierResolveJob {
    pub fn new(store: Arc<dyn PageStore>, legacy_key: String, canonical: String) -> Self {
        Self {
            store,
            legacy_key,
            canonical,
            pipeline: ContentPipeline::identifier_fixes(),
        }
    }

    pub fn legacy_key(&self) -> &str {
        &self.legacy_key
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Run the migration.
    ///
    /// 1. Read the legacy key directly. A missing page fails the job.
    /// 2. Read the canonical key, which may be empty.
    /// 3. When both exist, the larger content wins; ties go to canonical.
    /// 4. Rewrite identifier fields of the winner. A canonical winner that
    ///    needs no rewrite is left in place and only the legacy copy goes.
    /// 5. Otherwise soft-delete every copy being replaced, canonical first,
    ///    before anything is written, then write the winner under the
    ///    canonical key. The two keys can be the same slot.
    ///
    /// Each key is checked against what was read right before it is
    /// touched; a page edited mid-resolve fails the job with
    /// [`Error::Conflict`]. Any failure after a soft-delete puts the held
    /// copies back into slots that are still empty.
    pub async fn resolve(&self) -> Result<Resolution> {
        let canonical_key = storage_key(&self.canonical);
        let same_key = canonical_key == self.legacy_key;

        let legacy = self.store.read_raw(&self.legacy_key).await?;
        let existing = if same_key {
            Some(legacy.clone())
        } else {
            match self.store.read_raw(&canonical_key).await {
                Ok(content) => Some(content),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            }
        };

        let (winner, resolution) = match &existing {
            None => (&legacy, Resolution::Moved),
            Some(current) if legacy.len() > current.len() => (&legacy, Resolution::LegacyKept),
            Some(current) => (current, Resolution::CanonicalKept),
        };
        debug!(
            storage_key = %self.legacy_key,
            canonical = %self.canonical,
            ?resolution,
            content_len = winner.len(),
            "Resolved shadow conflict"
        );

        let content = self.fix_identifiers(winner);

        if resolution == Resolution::CanonicalKept && content == *winner {
            if !same_key {
                self.expect_stored(&self.legacy_key, Some(legacy.as_slice())).await?;
                self.store.soft_delete(&self.legacy_key).await?;
            }
            return Ok(resolution);
        }

        let mut replaced: Vec<(&str, &[u8])> = Vec::with_capacity(2);
        if let (Some(current), false) = (&existing, same_key) {
            replaced.push((canonical_key.as_str(), current.as_slice()));
        }
        replaced.push((self.legacy_key.as_str(), legacy.as_slice()));

        let mut held: Vec<(&str, &[u8])> = Vec::with_capacity(2);
        for (key, expected) in replaced {
            let step = async {
                self.expect_stored(key, Some(expected)).await?;
                self.store.soft_delete(key).await
            };
            if let Err(e) = step.await {
                self.restore(&held).await;
                return Err(e);
            }
            held.push((key, expected));
        }

        let written = async {
            self.expect_stored(&canonical_key, None).await?;
            self.store.write_raw(&canonical_key, &content).await
        };
        if let Err(e) = written.await {
            self.restore(&held).await;
            return Err(e);
        }
        Ok(resolution)
    }

    fn fix_identifiers(&self, winner: &[u8]) -> Vec<u8> {
        match self.pipeline.apply_migrations(winner) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    canonical = %self.canonical,
                    migration = %e.migration,
                    error = %e.source,
                    "Identifier fixes failed, writing content unmodified"
                );
                e.into_original()
            }
        }
    }

    /// Fail with a conflict unless `key` holds exactly `expected`
    /// (`None` meaning no page).
    async fn expect_stored(&self, key: &str, expected: Option<&[u8]>) -> Result<()> {
        let found = match self.store.read_raw(key).await {
            Ok(content) => Some(content),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        if found.as_deref() == expected {
            return Ok(());
        }
        Err(Error::Conflict(format!(
            "page {key} changed while resolving {}",
            self.canonical
        )))
    }

    /// Best-effort undo of soft-deletes. A slot that has been written since
    /// keeps its new content; the held copy stays in the holding area.
    async fn restore(&self, held: &[(&str, &[u8])]) {
        for (key, content) in held.iter().rev() {
            if let Err(e) = self.expect_stored(key, None).await {
                warn!(
                    storage_key = %key,
                    canonical = %self.canonical,
                    error = %e,
                    "Not restoring page, slot is in use"
                );
                continue;
            }
            match self.store.write_raw(key, content).await {
                Ok(()) => warn!(
                    storage_key = %key,
                    canonical = %self.canonical,
                    "Restored page after failed resolve"
                ),
                Err(e) => error!(
                    storage_key = %key,
                    canonical = %self.canonical,
                    error = %e,
                    "Failed to restore page, copy remains held"
                ),
            }
        }
    }
}

#[async_trait]
impl Job for IdentifierResolveJob {
    fn name(&self) -> &str {
        &self.canonical
    }

    async fn execute(&self) -> Result<()> {
        let start = Instant::now();
        let resolution = self.resolve().await?;
        info!(
            storage_key = %self.legacy_key,
            canonical = %self.canonical,
            ?resolution,
            duration_ms = start.elapsed().as_millis() as u64,
            "Migrated page to canonical key"
        );
        Ok(())
    }
}
