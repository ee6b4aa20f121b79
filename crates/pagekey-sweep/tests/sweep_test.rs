//! Integration tests for the reconciliation sweep against a real file store.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::timeout;

use pagekey_core::{Error, Result};
use pagekey_jobs::{CoordinatorConfig, JobCoordinator};
use pagekey_store::{FilesystemStore, PageStore};
use pagekey_sweep::{dispatch_sweep, IdentifierResolveJob, IdentifierScanJob, Resolution, ScanSummary};

struct Fixture {
    _dir: TempDir,
    store: Arc<FilesystemStore>,
    coordinator: JobCoordinator,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FilesystemStore::new(dir.path()));
        let coordinator = JobCoordinator::new(CoordinatorConfig::default()).unwrap();
        Self {
            _dir: dir,
            store,
            coordinator,
        }
    }

    async fn put(&self, key: &str, content: &str) {
        self.store.write_raw(key, content.as_bytes()).await.unwrap();
    }

    async fn get(&self, key: &str) -> String {
        String::from_utf8(self.store.read_raw(key).await.unwrap()).unwrap()
    }

    async fn sweep(&self) {
        dispatch_sweep(self.store.clone(), &self.coordinator).unwrap();
        timeout(Duration::from_secs(10), self.coordinator.wait_until_idle())
            .await
            .expect("sweep did not finish");
    }

    fn resolver(&self, legacy_key: &str, canonical: &str) -> IdentifierResolveJob {
        IdentifierResolveJob::new(self.store.clone(), legacy_key.to_string(), canonical.to_string())
    }

    fn faulty(&self) -> FaultyStore {
        FaultyStore {
            inner: self.store.clone(),
            fail_write_once: Mutex::new(None),
            fail_delete: None,
            after_delete: Mutex::new(None),
        }
    }

    /// Contents of every soft-deleted file, sorted.
    fn held(&self) -> Vec<String> {
        fn walk(dir: &Path, out: &mut Vec<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    out.push(std::fs::read_to_string(&path).unwrap());
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.store.deleted_root(), &mut out);
        out.sort();
        out
    }
}

/// Real store with injected write/delete failures, plus a hook that saves a
/// page right after a given key is soft-deleted, like an editor racing the
/// resolver.
struct FaultyStore {
    inner: Arc<FilesystemStore>,
    fail_write_once: Mutex<Option<String>>,
    fail_delete: Option<String>,
    after_delete: Mutex<Option<(String, String, Vec<u8>)>>,
}

impl FaultyStore {
    fn fail_write_once(self, key: &str) -> Self {
        *self.fail_write_once.lock().unwrap() = Some(key.to_string());
        self
    }

    fn fail_delete(mut self, key: &str) -> Self {
        self.fail_delete = Some(key.to_string());
        self
    }

    fn save_after_delete(self, deleted: &str, key: &str, content: &str) -> Self {
        *self.after_delete.lock().unwrap() =
            Some((deleted.to_string(), key.to_string(), content.as_bytes().to_vec()));
        self
    }

    fn resolver(self, legacy_key: &str, canonical: &str) -> IdentifierResolveJob {
        IdentifierResolveJob::new(Arc::new(self), legacy_key.to_string(), canonical.to_string())
    }
}

#[async_trait]
impl PageStore for FaultyStore {
    async fn read_raw(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.read_raw(key).await
    }

    async fn write_raw(&self, key: &str, content: &[u8]) -> Result<()> {
        let fail = {
            let mut target = self.fail_write_once.lock().unwrap();
            if target.as_deref() == Some(key) {
                target.take();
                true
            } else {
                false
            }
        };
        if fail {
            return Err(Error::Storage("disk full".to_string()));
        }
        self.inner.write_raw(key, content).await
    }

    async fn soft_delete(&self, key: &str) -> Result<()> {
        if self.fail_delete.as_deref() == Some(key) {
            return Err(Error::Storage("holding area unavailable".to_string()));
        }
        self.inner.soft_delete(key).await?;

        let save = {
            let mut hook = self.after_delete.lock().unwrap();
            if hook.as_ref().is_some_and(|(deleted, _, _)| deleted == key) {
                hook.take()
            } else {
                None
            }
        };
        if let Some((_, target, content)) = save {
            self.inner.write_raw(&target, &content).await?;
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.inner.list_keys().await
    }
}

#[tokio::test]
async fn test_legacy_page_moves_to_canonical_key() {
    let fx = Fixture::new();
    let page = "+++\ntitle = \"Garage\"\n+++\nShelves and bins.\n";
    fx.put("my%20page", page).await;

    fx.sweep().await;

    assert_eq!(fx.store.list_keys().await.unwrap(), vec!["my_page"]);
    assert_eq!(fx.get("my_page").await, page);
    assert!(fx.store.read_raw("my%20page").await.unwrap_err().is_not_found());
    assert_eq!(fx.held(), vec![page.to_string()]);

    let (key, _) = fx.store.read_preferring_canonical("My Page").await.unwrap();
    assert_eq!(key, "my_page");
}

#[tokio::test]
async fn test_identifier_field_decides_destination_and_is_rewritten() {
    let fx = Fixture::new();
    fx.put("mypage", "+++\nidentifier = \"MyPage\"\ntitle = \"t\"\n+++\nbody\n")
        .await;

    fx.sweep().await;

    assert_eq!(fx.store.list_keys().await.unwrap(), vec!["my_page"]);
    assert_eq!(
        fx.get("my_page").await,
        "+++\nidentifier = \"my_page\"\ntitle = \"t\"\n+++\nbody\n"
    );
}

#[tokio::test]
async fn test_larger_legacy_copy_wins_and_both_originals_are_kept() {
    let fx = Fixture::new();
    let legacy = "+++\ntitle = \"Pantry\"\n+++\nFlour, sugar, rice, beans.\n";
    let canonical = "+++\ntitle = \"Pantry\"\n+++\nFlour.\n";
    fx.put("pantry%20shelf", legacy).await;
    fx.put("pantry_shelf", canonical).await;

    let resolution = fx.resolver("pantry%20shelf", "pantry_shelf").resolve().await.unwrap();

    assert_eq!(resolution, Resolution::LegacyKept);
    assert_eq!(fx.store.list_keys().await.unwrap(), vec!["pantry_shelf"]);
    assert_eq!(fx.get("pantry_shelf").await, legacy);
    assert_eq!(fx.held(), {
        let mut both = vec![legacy.to_string(), canonical.to_string()];
        both.sort();
        both
    });
}

#[tokio::test]
async fn test_canonical_copy_wins_ties() {
    let fx = Fixture::new();
    let legacy = "+++\n+++\nAAAA\n";
    let canonical = "+++\n+++\nBBBB\n";
    fx.put("tool%20box", legacy).await;
    fx.put("tool_box", canonical).await;

    let resolution = fx.resolver("tool%20box", "tool_box").resolve().await.unwrap();

    assert_eq!(resolution, Resolution::CanonicalKept);
    assert_eq!(fx.get("tool_box").await, canonical);
    assert!(fx.store.read_raw("tool%20box").await.unwrap_err().is_not_found());
    assert_eq!(fx.held(), vec![legacy.to_string()]);
}

#[tokio::test]
async fn test_missing_legacy_page_fails_only_that_task() {
    let fx = Fixture::new();
    fx.put("ghost_town", "+++\n+++\nstill here\n").await;

    let err = fx.resolver("ghost%20town", "ghost_town").resolve().await.unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(fx.get("ghost_town").await, "+++\n+++\nstill here\n");
    assert!(fx.held().is_empty());
}

#[tokio::test]
async fn test_same_slot_legacy_and_canonical_survive() {
    let fx = Fixture::new();
    let page = "+++\ntitle = \"x\"\n+++\nbody\n";
    fx.put("same_slot", page).await;

    let resolution = fx.resolver("same_slot", "same_slot").resolve().await.unwrap();

    assert_eq!(resolution, Resolution::CanonicalKept);
    assert_eq!(fx.get("same_slot").await, page);
}

#[tokio::test]
async fn test_scan_summary_buckets() {
    let fx = Fixture::new();
    fx.put("already_fine", "+++\n+++\n").await;
    fx.put("%21%21%21", "+++\n+++\n").await;
    fx.put("mypage", "+++\nidentifier = \"MYPAGE\"\n+++\n").await;
    fx.put("legacy%20one", "+++\n+++\n").await;

    let scan = IdentifierScanJob::new(fx.store.clone(), fx.coordinator.clone());
    let summary = scan.scan().await.unwrap();
    timeout(Duration::from_secs(10), fx.coordinator.wait_until_idle())
        .await
        .unwrap();

    assert_eq!(
        summary,
        ScanSummary {
            pages_scanned: 4,
            already_canonical: 1,
            unnormalizable: 1,
            same_slot: 1,
            enqueued: 1,
            rejected: 0,
        }
    );
    assert_eq!(
        fx.store.list_keys().await.unwrap(),
        vec!["%21%21%21", "already_fine", "legacy_one", "mypage"]
    );
}

#[tokio::test]
async fn test_moves_to_one_destination_run_in_turn() {
    let fx = Fixture::new();
    let short = "+++\n+++\nshort\n";
    let long = "+++\n+++\nthe longer of the two\n";
    fx.put("my%20page", short).await;
    fx.put("my-page", long).await;

    fx.sweep().await;

    assert_eq!(fx.store.list_keys().await.unwrap(), vec!["my_page"]);
    assert_eq!(fx.get("my_page").await, long);
    // First move parks the short legacy copy; the second parks the short
    // canonical copy and the long legacy copy it replaces them with.
    assert_eq!(fx.held(), vec![short.to_string(), short.to_string(), long.to_string()]);
}

#[tokio::test]
async fn test_sweep_is_a_no_op_on_a_clean_store() {
    let fx = Fixture::new();
    fx.put("my_page", "+++\nidentifier = \"my_page\"\n+++\n").await;

    fx.sweep().await;
    fx.sweep().await;

    assert_eq!(fx.store.list_keys().await.unwrap(), vec!["my_page"]);
    assert!(fx.held().is_empty());
}

#[tokio::test]
async fn test_canonical_winner_gets_identifier_fixed() {
    let fx = Fixture::new();
    let legacy = "+++\n+++\nA\n";
    let canonical = "+++\nidentifier = \"Tool Box\"\n+++\nHammer, saw, level.\n";
    fx.put("tool%20box", legacy).await;
    fx.put("tool_box", canonical).await;

    let resolution = fx.resolver("tool%20box", "tool_box").resolve().await.unwrap();

    assert_eq!(resolution, Resolution::CanonicalKept);
    assert_eq!(
        fx.get("tool_box").await,
        "+++\nidentifier = \"tool_box\"\n+++\nHammer, saw, level.\n"
    );
    assert_eq!(fx.held(), vec![legacy.to_string(), canonical.to_string()]);
}

#[tokio::test]
async fn test_failed_write_restores_both_copies() {
    let fx = Fixture::new();
    let legacy = "+++\ntitle = \"Pantry\"\n+++\nFlour, sugar, rice, beans.\n";
    let canonical = "+++\ntitle = \"Pantry\"\n+++\nFlour.\n";
    fx.put("pantry%20shelf", legacy).await;
    fx.put("pantry_shelf", canonical).await;

    let err = fx
        .faulty()
        .fail_write_once("pantry_shelf")
        .resolver("pantry%20shelf", "pantry_shelf")
        .resolve()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(
        fx.store.list_keys().await.unwrap(),
        vec!["pantry%20shelf", "pantry_shelf"]
    );
    assert_eq!(fx.get("pantry%20shelf").await, legacy);
    assert_eq!(fx.get("pantry_shelf").await, canonical);
}

#[tokio::test]
async fn test_failed_move_restores_legacy_page() {
    let fx = Fixture::new();
    let page = "+++\ntitle = \"Garage\"\n+++\n";
    fx.put("my%20page", page).await;

    let result = fx
        .faulty()
        .fail_write_once("my_page")
        .resolver("my%20page", "my_page")
        .resolve()
        .await;

    assert!(result.is_err());
    assert_eq!(fx.store.list_keys().await.unwrap(), vec!["my%20page"]);
    assert_eq!(fx.get("my%20page").await, page);
}

#[tokio::test]
async fn test_failed_delete_leaves_both_copies() {
    let fx = Fixture::new();
    let legacy = "+++\n+++\nthe larger legacy copy\n";
    let canonical = "+++\n+++\nsmall\n";
    fx.put("pantry%20shelf", legacy).await;
    fx.put("pantry_shelf", canonical).await;

    let err = fx
        .faulty()
        .fail_delete("pantry%20shelf")
        .resolver("pantry%20shelf", "pantry_shelf")
        .resolve()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(fx.get("pantry%20shelf").await, legacy);
    assert_eq!(fx.get("pantry_shelf").await, canonical);
}

#[tokio::test]
async fn test_live_edit_during_tie_is_kept() {
    let fx = Fixture::new();
    let legacy = "+++\n+++\nAAAA\n";
    let fresh = "+++\n+++\nFRESH USER EDIT\n";
    fx.put("tool%20box", legacy).await;
    fx.put("tool_box", "+++\n+++\nBBBB\n").await;

    let resolution = fx
        .faulty()
        .save_after_delete("tool%20box", "tool_box", fresh)
        .resolver("tool%20box", "tool_box")
        .resolve()
        .await
        .unwrap();

    assert_eq!(resolution, Resolution::CanonicalKept);
    assert_eq!(fx.get("tool_box").await, fresh);
    assert_eq!(fx.held(), vec![legacy.to_string()]);
}

#[tokio::test]
async fn test_live_edit_before_rewrite_fails_without_overwriting() {
    let fx = Fixture::new();
    let legacy = "+++\n+++\nA\n";
    let canonical = "+++\nidentifier = \"Tool Box\"\n+++\nHammer, saw, level.\n";
    let fresh = "+++\nidentifier = \"tool_box\"\n+++\nFRESH USER EDIT\n";
    fx.put("tool%20box", legacy).await;
    fx.put("tool_box", canonical).await;

    let err = fx
        .faulty()
        .save_after_delete("tool%20box", "tool_box", fresh)
        .resolver("tool%20box", "tool_box")
        .resolve()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(fx.get("tool_box").await, fresh);
    assert_eq!(fx.get("tool%20box").await, legacy);
    // The replaced canonical copy is still recoverable.
    assert!(fx.held().contains(&canonical.to_string()));
}

#[test]
fn test_summary_serializes() {
    let json = serde_json::to_value(ScanSummary {
        pages_scanned: 3,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(json["pages_scanned"], 3);
    assert_eq!(json["enqueued"], 0);
}
