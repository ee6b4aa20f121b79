//! File-backed page store.
//!
//! Layout under the data directory:
//!
//! ```text
//! {data_dir}/{key}.md                               live pages
//! {data_dir}/{key}.md.{pid}.{seq}.tmp               in-flight atomic writes
//! {data_dir}/__deleted__/{unix-seconds}/{key}.md    soft-deleted pages
//! {data_dir}/__deleted__/{unix-seconds}/{key}.md.1  ...same second, same key
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use pagekey_core::defaults::{DATA_DIR, DELETED_DIR, PAGE_EXTENSION};
use pagekey_core::{Error, Result};

use crate::backend::PageStore;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Configuration for the file-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one file per page.
    pub data_dir: PathBuf,
    /// Name of the holding area for soft-deleted pages, inside `data_dir`.
    pub deleted_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR),
            deleted_dir: DELETED_DIR.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PAGEKEY_DATA_DIR` | `./data` | Directory holding page files |
    /// | `PAGEKEY_DELETED_DIR` | `__deleted__` | Holding area for soft-deleted pages |
    pub fn from_env() -> Self {
        let data_dir = std::env::var("PAGEKEY_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DATA_DIR));

        let deleted_dir = std::env::var("PAGEKEY_DELETED_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty() && !v.contains(['/', '\\']))
            .unwrap_or_else(|| DELETED_DIR.to_string());

        Self {
            data_dir,
            deleted_dir,
        }
    }

    /// Use a different data directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

/// Stores each page as `{data_dir}/{key}.md`.
pub struct FilesystemStore {
    data_dir: PathBuf,
    deleted_dir: String,
}

impl FilesystemStore {
    /// Create a store rooted at `data_dir` with the default holding area.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            deleted_dir: DELETED_DIR.to_string(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            deleted_dir: config.deleted_dir.clone(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Root of the soft-delete holding area.
    pub fn deleted_root(&self) -> PathBuf {
        self.data_dir.join(&self.deleted_dir)
    }

    fn file_name(key: &str) -> String {
        format!("{key}.{PAGE_EXTENSION}")
    }

    /// Per-write temp file. Never ends in the page extension, so listings
    /// skip it.
    fn temp_path(&self, key: &str) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.data_dir.join(format!(
            "{}.{}.{}.tmp",
            Self::file_name(key),
            std::process::id(),
            seq
        ))
    }

    async fn write_temp(temp_path: &Path, content: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "store: File::create failed");
            e
        })?;
        file.write_all(content).await.map_err(|e| {
            warn!(error = %e, "store: write_all failed");
            e
        })?;
        file.sync_all().await?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp_path, std::fs::Permissions::from_mode(0o644)).await?;
        }
        Ok(())
    }

    fn page_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == self.deleted_dir {
            return Err(Error::InvalidInput(format!("invalid storage key: {key:?}")));
        }
        Ok(self.data_dir.join(Self::file_name(key)))
    }

    /// Validate that the store can write, read, and remove files.
    ///
    /// Performs a full round-trip at startup so permission problems and
    /// missing directories show up before the first page read.
    pub async fn validate(&self) -> Result<()> {
        let test_file = self.data_dir.join(".health-check.tmp");

        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| Error::Storage(format!("create_dir_all({:?}): {}", self.data_dir, e)))?;

        let data = b"pagekey-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| Error::Storage(format!("write({:?}): {}", test_file, e)))?;

        let read_back = fs::read(&test_file)
            .await
            .map_err(|e| Error::Storage(format!("read({:?}): {}", test_file, e)))?;
        if read_back != data {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| Error::Storage(format!("remove_file({:?}): {}", test_file, e)))?;

        Ok(())
    }

    /// Soft-delete `key` and return where the page was moved.
    pub async fn soft_delete_to(&self, key: &str) -> Result<PathBuf> {
        let source = self.page_path(key)?;
        if !fs::try_exists(&source).await? {
            return Err(Error::NotFound(format!("page {key}")));
        }

        let bucket = self
            .deleted_root()
            .join(Utc::now().timestamp().to_string());
        fs::create_dir_all(&bucket).await?;

        let file_name = Self::file_name(key);
        let mut target = bucket.join(&file_name);
        let mut suffix = 1u32;
        while fs::try_exists(&target).await? {
            target = bucket.join(format!("{file_name}.{suffix}"));
            suffix += 1;
        }

        fs::rename(&source, &target).await.map_err(|e| {
            warn!(from = %source.display(), to = %target.display(), error = %e, "store: soft delete rename failed");
            e
        })?;

        info!(storage_key = key, to = %target.display(), "Soft-deleted page");
        Ok(target)
    }
}

#[async_trait]
impl PageStore for FilesystemStore {
    async fn read_raw(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.page_path(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("page {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_raw(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.page_path(key)?;
        debug!(storage_key = key, path = %path.display(), content_len = content.len(), "store: write");

        fs::create_dir_all(&self.data_dir).await.map_err(|e| {
            warn!(dir = %self.data_dir.display(), error = %e, "store: create_dir_all failed");
            e
        })?;

        // Atomic write: one temp file per call + rename. The last rename wins.
        let temp_path = self.temp_path(key);
        if let Err(e) = Self::write_temp(&temp_path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(from = %temp_path.display(), to = %path.display(), error = %e, "store: rename failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn soft_delete(&self, key: &str) -> Result<()> {
        self.soft_delete_to(key).await.map(|_| ())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{PAGE_EXTENSION}");
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(name = ?entry.file_name(), "store: skipping non UTF-8 file name");
                continue;
            };
            if let Some(key) = name.strip_suffix(&suffix) {
                if !key.is_empty() {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
