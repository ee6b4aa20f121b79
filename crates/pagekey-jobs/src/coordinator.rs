//! Task queue coordinator.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, error, info, warn};

use pagekey_core::defaults::{EVENT_BUS_CAPACITY, QUEUE_CAPACITY};
use pagekey_core::Error;

use crate::error::JobError;
use crate::job::{CompletionCallback, Job};

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Dispatch capacity of each named queue.
    pub queue_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: QUEUE_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PAGEKEY_QUEUE_CAPACITY` | `1024` | Jobs a single queue may hold before enqueue fails |
    pub fn from_env() -> Self {
        let queue_capacity = std::env::var("PAGEKEY_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(QUEUE_CAPACITY)
            .max(1);

        Self { queue_capacity }
    }

    /// Set the per-queue dispatch capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Event emitted by queue workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A job was picked up by its queue worker.
    JobStarted { queue: String },
    /// A job returned successfully.
    JobCompleted { queue: String, duration_ms: u64 },
    /// A job returned an error or panicked.
    JobFailed { queue: String, error: String },
}

/// Snapshot of one queue's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_name: String,
    /// Jobs waiting or running.
    pub jobs_remaining: usize,
    /// Deepest the queue has been during the current burst; 0 when idle.
    pub high_water_mark: usize,
    pub is_active: bool,
}

/// Snapshot across all queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    /// True while any queue has work.
    pub is_active: bool,
    /// Active queues, sorted by name.
    pub queues: Vec<QueueStats>,
}

struct Envelope {
    job: Arc<dyn Job>,
    on_complete: Option<CompletionCallback>,
}

struct QueueState {
    sender: mpsc::Sender<Envelope>,
    jobs_remaining: usize,
    high_water_mark: usize,
    is_active: bool,
}

impl QueueState {
    fn stats(&self, name: &str) -> QueueStats {
        QueueStats {
            queue_name: name.to_string(),
            jobs_remaining: self.jobs_remaining,
            high_water_mark: self.high_water_mark,
            is_active: self.is_active,
        }
    }
}

struct Shared {
    queues: Mutex<HashMap<String, QueueState>>,
    events: broadcast::Sender<QueueEvent>,
    idle: Notify,
}

impl Shared {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bookkeeping after a job finished, whatever its outcome.
    fn finish(&self, queue: &str) {
        let mut queues = self.queues();
        let remaining = match queues.get_mut(queue) {
            Some(state) => {
                state.jobs_remaining = state.jobs_remaining.saturating_sub(1);
                if state.jobs_remaining == 0 {
                    state.is_active = false;
                    state.high_water_mark = 0;
                }
                state.jobs_remaining
            }
            None => 0,
        };
        let idle = queues.values().all(|q| !q.is_active);
        drop(queues);

        debug!(queue, jobs_remaining = remaining, "Job finished");
        if idle {
            self.idle.notify_waiters();
        }
    }
}

/// Dispatches jobs onto named, single-worker FIFO queues.
///
/// Each distinct job name gets its own queue and worker task, created on
/// first use. Jobs in one queue run strictly one at a time in submission
/// order; different queues run concurrently. All counters live behind one
/// lock that is never held while a job runs.
///
/// The coordinator is cheap to clone; clones share the same queues, which
/// lets a completion callback enqueue follow-up work.
#[derive(Clone)]
pub struct JobCoordinator {
    shared: Arc<Shared>,
    runtime: Handle,
    capacity: usize,
}

impl JobCoordinator {
    /// Create a coordinator on the current tokio runtime.
    pub fn new(config: CoordinatorConfig) -> Result<Self, JobError> {
        let runtime = Handle::try_current().map_err(|_| JobError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create a coordinator whose queue workers run on `runtime`.
    pub fn with_runtime(config: CoordinatorConfig, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                queues: Mutex::new(HashMap::new()),
                events,
                idle: Notify::new(),
            }),
            runtime,
            capacity: config.queue_capacity.max(1),
        }
    }

    /// Submit a job to the queue named by `job.name()`.
    ///
    /// Fails only when the queue cannot accept the job; the counters are
    /// then left exactly as they were.
    pub fn enqueue_job(&self, job: Arc<dyn Job>) -> Result<(), JobError> {
        self.dispatch(Envelope {
            job,
            on_complete: None,
        })
    }

    /// Like [`enqueue_job`](Self::enqueue_job), and once the job has run,
    /// `on_complete` is called on the same queue worker with its outcome.
    pub fn enqueue_job_with_completion<F>(
        &self,
        job: Arc<dyn Job>,
        on_complete: F,
    ) -> Result<(), JobError>
    where
        F: FnOnce(pagekey_core::Result<()>) + Send + 'static,
    {
        self.dispatch(Envelope {
            job,
            on_complete: Some(Box::new(on_complete)),
        })
    }

    fn dispatch(&self, envelope: Envelope) -> Result<(), JobError> {
        let name = envelope.job.name().to_string();
        let mut queues = self.shared.queues();

        let state = match queues.entry(name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.spawn_queue(&name)),
        };

        let previous = (state.jobs_remaining, state.high_water_mark, state.is_active);
        state.jobs_remaining += 1;
        state.high_water_mark = state.high_water_mark.max(state.jobs_remaining);
        state.is_active = true;

        match state.sender.try_send(envelope) {
            Ok(()) => {
                debug!(
                    queue = %name,
                    jobs_remaining = state.jobs_remaining,
                    high_water_mark = state.high_water_mark,
                    "Job enqueued"
                );
                Ok(())
            }
            Err(e) => {
                (state.jobs_remaining, state.high_water_mark, state.is_active) = previous;
                let err = match e {
                    TrySendError::Full(_) => JobError::QueueSaturated {
                        queue: name,
                        capacity: self.capacity,
                    },
                    TrySendError::Closed(_) => JobError::QueueClosed { queue: name },
                };
                warn!(error = %err, "Job rejected at enqueue");
                Err(err)
            }
        }
    }

    fn spawn_queue(&self, name: &str) -> QueueState {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.runtime
            .spawn(run_queue(self.shared.clone(), name.to_string(), receiver));
        debug!(queue = name, capacity = self.capacity, "Created queue");
        QueueState {
            sender,
            jobs_remaining: 0,
            high_water_mark: 0,
            is_active: false,
        }
    }

    /// Counters of one queue, or `None` if no job with that name was ever
    /// enqueued.
    pub fn get_queue_stats(&self, name: &str) -> Option<QueueStats> {
        self.shared.queues().get(name).map(|state| state.stats(name))
    }

    /// Names of queues with work, sorted.
    pub fn get_active_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .queues()
            .iter()
            .filter(|(_, state)| state.is_active)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Overall progress across every active queue.
    pub fn get_job_progress(&self) -> JobProgress {
        let mut queues: Vec<QueueStats> = self
            .shared
            .queues()
            .iter()
            .filter(|(_, state)| state.is_active)
            .map(|(name, state)| state.stats(name))
            .collect();
        queues.sort_by(|a, b| a.queue_name.cmp(&b.queue_name));
        JobProgress {
            is_active: !queues.is_empty(),
            queues,
        }
    }

    /// True when no queue has work.
    pub fn is_idle(&self) -> bool {
        self.shared.queues().values().all(|q| !q.is_active)
    }

    /// Wait until every queue has drained, including jobs enqueued by
    /// completion callbacks along the way.
    pub async fn wait_until_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.shared.idle.notified());
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Subscribe to job lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }
}

/// Worker loop of one queue. Runs for the lifetime of the coordinator.
async fn run_queue(shared: Arc<Shared>, queue: String, mut receiver: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { job, on_complete }) = receiver.recv().await {
        let start = Instant::now();
        let _ = shared.events.send(QueueEvent::JobStarted {
            queue: queue.clone(),
        });

        let result = match AssertUnwindSafe(job.execute()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::Internal(format!(
                "job panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => {
                info!(queue = %queue, duration_ms, "Job completed");
                let _ = shared.events.send(QueueEvent::JobCompleted {
                    queue: queue.clone(),
                    duration_ms,
                });
            }
            Err(e) => {
                error!(queue = %queue, duration_ms, error = %e, "Job failed");
                let _ = shared.events.send(QueueEvent::JobFailed {
                    queue: queue.clone(),
                    error: e.to_string(),
                });
            }
        }

        if let Some(callback) = on_complete {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
                error!(
                    queue = %queue,
                    error = panic_message(panic.as_ref()),
                    "Completion callback panicked"
                );
            }
        }

        shared.finish(&queue);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.queue_capacity, QUEUE_CAPACITY);
        assert_eq!(config.with_queue_capacity(0).queue_capacity, 1);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = JobCoordinator::new(CoordinatorConfig::default());
        assert!(matches!(result, Err(JobError::NoRuntime)));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_progress_serializes() {
        let progress = JobProgress {
            is_active: true,
            queues: vec![QueueStats {
                queue_name: "a".to_string(),
                jobs_remaining: 2,
                high_water_mark: 3,
                is_active: true,
            }],
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["queues"][0]["high_water_mark"], 3);
    }
}
