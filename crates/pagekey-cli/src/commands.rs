//! Command implementations, separate from argument parsing so tests can
//! drive them with an in-memory writer.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info};

use pagekey_content::ContentPipeline;
use pagekey_core::{normalize, same_slot};
use pagekey_jobs::{JobCoordinator, JobProgress, QueueEvent};
use pagekey_store::PageStore;
use pagekey_sweep::{declared_identifier, dispatch_sweep};

/// Print `raw -> canonical` (or the error) for each identifier.
///
/// Returns `false` when any identifier failed to normalize.
pub fn normalize_ids<W: Write>(ids: &[String], out: &mut W) -> Result<bool> {
    let mut all_ok = true;
    for raw in ids {
        match normalize(raw) {
            Ok(canonical) => writeln!(out, "{raw} -> {canonical}")?,
            Err(e) => {
                all_ok = false;
                writeln!(out, "{raw} -> error: {e}")?;
            }
        }
    }
    Ok(all_ok)
}

/// What `migrate` did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// No migration applied.
    Unchanged,
    /// Content changed and was printed.
    Changed,
    /// Content changed and the file was rewritten.
    Written,
}

/// Run the content pipeline over one file.
///
/// Without `write` the resulting content is printed whether or not it
/// changed. With `write` only a status line is printed and the file is
/// replaced when its content changed. A failing migration leaves the file
/// untouched and is reported as an error naming the step.
pub async fn migrate_file<W: Write>(
    path: &Path,
    write: bool,
    format_upgrade: bool,
    out: &mut W,
) -> Result<MigrateOutcome> {
    let pipeline = if format_upgrade {
        ContentPipeline::format_upgrade()
    } else {
        ContentPipeline::rolling()
    };

    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let migrated = pipeline
        .apply_migrations(&content)
        .with_context(|| format!("failed to migrate {}", path.display()))?;
    let changed = migrated != content;

    if !write {
        out.write_all(&migrated)?;
        return Ok(if changed {
            MigrateOutcome::Changed
        } else {
            MigrateOutcome::Unchanged
        });
    }

    if !changed {
        writeln!(out, "{}: unchanged", path.display())?;
        return Ok(MigrateOutcome::Unchanged);
    }

    tokio::fs::write(path, &migrated)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        before = content.len(),
        after = migrated.len(),
        "Migrated file"
    );
    writeln!(out, "{}: migrated", path.display())?;
    Ok(MigrateOutcome::Written)
}

/// One stored page as the scanner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRow {
    pub key: String,
    /// Identifier from the `identifier` field, else decoded from the key.
    pub declared: String,
    /// `None` when the declared identifier cannot be normalized.
    pub canonical: Option<String>,
    /// True when a sweep would move this page.
    pub needs_move: bool,
}

/// Describe every stored page, in key order.
pub async fn key_rows(store: &dyn PageStore) -> Result<Vec<KeyRow>> {
    let mut rows = Vec::new();
    for key in store.list_keys().await? {
        let content = store.read_raw(&key).await.unwrap_or_default();
        let declared = declared_identifier(&key, &content);
        let canonical = normalize(&declared).ok();
        let needs_move = canonical
            .as_deref()
            .is_some_and(|c| c != declared && !same_slot(&declared, c));
        rows.push(KeyRow {
            key,
            declared,
            canonical,
            needs_move,
        });
    }
    Ok(rows)
}

/// A job that failed during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub queue: String,
    pub error: String,
}

/// Outcome of a sweep run from the command line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Jobs that returned successfully, the scan included.
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub failures: Vec<JobFailure>,
    /// Lifecycle events dropped because the report fell behind.
    pub events_missed: u64,
    /// Page keys left in the store afterwards.
    pub pages_after: usize,
    /// Coordinator snapshot once the sweep has drained.
    pub progress: JobProgress,
}

impl SweepReport {
    fn record(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::JobStarted { .. } => {}
            QueueEvent::JobCompleted { .. } => self.jobs_completed += 1,
            QueueEvent::JobFailed { queue, error } => {
                self.jobs_failed += 1;
                self.failures.push(JobFailure { queue, error });
            }
        }
    }
}

/// Dispatch a sweep and wait for it and every resolver it enqueues.
pub async fn run_sweep(store: Arc<dyn PageStore>, coordinator: &JobCoordinator) -> Result<SweepReport> {
    let mut events = coordinator.events();
    dispatch_sweep(store.clone(), coordinator).context("failed to dispatch sweep")?;

    let mut report = SweepReport::default();
    loop {
        tokio::select! {
            _ = coordinator.wait_until_idle() => break,
            event = events.recv() => match event {
                Ok(event) => report.record(event),
                Err(RecvError::Lagged(missed)) => report.events_missed += missed,
                Err(RecvError::Closed) => {
                    coordinator.wait_until_idle().await;
                    break;
                }
            },
        }
    }

    // Workers publish before they mark a job finished.
    loop {
        match events.try_recv() {
            Ok(event) => report.record(event),
            Err(TryRecvError::Lagged(missed)) => report.events_missed += missed,
            Err(_) => break,
        }
    }

    report.pages_after = store.list_keys().await?.len();
    report.progress = coordinator.get_job_progress();
    debug!(
        jobs_completed = report.jobs_completed,
        jobs_failed = report.jobs_failed,
        "Sweep drained"
    );
    Ok(report)
}
