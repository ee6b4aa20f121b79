//! Command behavior against temporary files and stores.

use std::sync::Arc;

use tempfile::TempDir;

use pagekey_cli::{key_rows, migrate_file, normalize_ids, run_sweep, KeyRow, MigrateOutcome};
use pagekey_jobs::{CoordinatorConfig, JobCoordinator};
use pagekey_store::{FilesystemStore, PageStore};

fn output(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap()
}

#[test]
fn test_normalize_prints_each_identifier() {
    let mut out = Vec::new();
    let ids = vec!["MyPage".to_string(), "Hello World".to_string()];

    assert!(normalize_ids(&ids, &mut out).unwrap());
    assert_eq!(output(out), "MyPage -> my_page\nHello World -> hello_world\n");
}

#[test]
fn test_normalize_reports_failures() {
    let mut out = Vec::new();
    let ids = vec!["!!!".to_string(), "fine".to_string()];

    assert!(!normalize_ids(&ids, &mut out).unwrap());
    let text = output(out);
    assert!(text.starts_with("!!! -> error: "), "{text}");
    assert!(text.ends_with("fine -> fine\n"), "{text}");
}

#[tokio::test]
async fn test_migrate_prints_without_touching_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("page.md");
    let page = "+++\ntitle = \"x\"\ninventory.container = \"box\"\n+++\nbody\n";
    std::fs::write(&path, page).unwrap();

    let mut out = Vec::new();
    let outcome = migrate_file(&path, false, false, &mut out).await.unwrap();

    assert_eq!(outcome, MigrateOutcome::Changed);
    assert_eq!(
        output(out),
        "+++\ntitle = \"x\"\n\n[inventory]\ncontainer = \"box\"\n+++\nbody\n"
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), page);
}

#[tokio::test]
async fn test_migrate_write_rewrites_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("page.md");
    std::fs::write(&path, "---\ntitle: Garage\n---\nbody\n").unwrap();

    let mut out = Vec::new();
    let outcome = migrate_file(&path, true, true, &mut out).await.unwrap();

    assert_eq!(outcome, MigrateOutcome::Written);
    assert!(output(out).ends_with(": migrated\n"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "+++\ntitle = \"Garage\"\n+++\nbody\n"
    );

    let mut out = Vec::new();
    let outcome = migrate_file(&path, true, true, &mut out).await.unwrap();
    assert_eq!(outcome, MigrateOutcome::Unchanged);
}

#[tokio::test]
async fn test_migrate_failure_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("page.md");
    let page = "---\ntitle: ~\n---\nbody\n";
    std::fs::write(&path, page).unwrap();

    let mut out = Vec::new();
    let err = migrate_file(&path, true, true, &mut out).await.unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("page.md"), "{message}");
    assert!(message.contains("yaml_to_toml"), "{message}");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), page);
}

#[tokio::test]
async fn test_migrate_missing_file() {
    let dir = TempDir::new().unwrap();
    let mut out = Vec::new();
    assert!(migrate_file(&dir.path().join("nope.md"), false, false, &mut out)
        .await
        .is_err());
}

#[tokio::test]
async fn test_key_rows_flag_pages_to_move() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path());
    store.write_raw("fine", b"+++\n+++\n").await.unwrap();
    store.write_raw("my%20page", b"+++\n+++\n").await.unwrap();
    store.write_raw("%21%21", b"+++\n+++\n").await.unwrap();

    let rows = key_rows(&store).await.unwrap();

    assert_eq!(
        rows,
        vec![
            KeyRow {
                key: "%21%21".into(),
                declared: "!!".into(),
                canonical: None,
                needs_move: false,
            },
            KeyRow {
                key: "fine".into(),
                declared: "fine".into(),
                canonical: Some("fine".into()),
                needs_move: false,
            },
            KeyRow {
                key: "my%20page".into(),
                declared: "my page".into(),
                canonical: Some("my_page".into()),
                needs_move: true,
            },
        ]
    );
}

#[tokio::test]
async fn test_sweep_report() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FilesystemStore::new(dir.path()));
    store.write_raw("my%20page", b"+++\n+++\nA\n").await.unwrap();
    store.write_raw("other%20page", b"+++\n+++\nB\n").await.unwrap();
    store.write_raw("kept", b"+++\n+++\nC\n").await.unwrap();
    let coordinator = JobCoordinator::new(CoordinatorConfig::default()).unwrap();

    let report = run_sweep(store.clone(), &coordinator).await.unwrap();

    // The scan plus one resolver per moved page.
    assert_eq!(report.jobs_completed, 3);
    assert_eq!(report.jobs_failed, 0);
    assert_eq!(report.events_missed, 0);
    assert_eq!(report.pages_after, 3);
    assert!(!report.progress.is_active);
    assert_eq!(
        store.list_keys().await.unwrap(),
        vec!["kept", "my_page", "other_page"]
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["jobs_completed"], 3);
}
