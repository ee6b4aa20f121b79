//! Storage seam.

use async_trait::async_trait;
use tracing::trace;

use pagekey_core::{normalize, storage_key, Result};

/// Raw page storage addressed by storage key.
///
/// Keys are the output of [`storage_key`]; implementations never normalize
/// or re-encode them.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Read the bytes stored under `key`. A missing key is
    /// [`Error::NotFound`](pagekey_core::Error::NotFound).
    async fn read_raw(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `content` under `key`, replacing any previous content.
    async fn write_raw(&self, key: &str, content: &[u8]) -> Result<()>;

    /// Move the page under `key` into a recoverable holding area.
    async fn soft_delete(&self, key: &str) -> Result<()>;

    /// Every stored key, sorted.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Read `identifier`, preferring the slot of its canonical form.
    ///
    /// Falls back to the identifier's own slot when the canonical slot is
    /// empty or the identifier cannot be normalized. Returns the key that
    /// was actually read along with its content.
    async fn read_preferring_canonical(&self, identifier: &str) -> Result<(String, Vec<u8>)> {
        if let Ok(canonical) = normalize(identifier) {
            let key = storage_key(&canonical);
            match self.read_raw(&key).await {
                Ok(content) => return Ok((key, content)),
                Err(e) if e.is_not_found() => {
                    trace!(identifier, canonical = %canonical, "Canonical slot empty, trying raw key");
                }
                Err(e) => return Err(e),
            }
        }

        let key = storage_key(identifier);
        let content = self.read_raw(&key).await?;
        Ok((key, content))
    }
}
