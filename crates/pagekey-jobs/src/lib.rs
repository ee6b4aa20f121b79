//! # pagekey-jobs
//!
//! Named, single-worker task queues.
//!
//! This crate provides:
//! - One FIFO queue per job name, created on first use and kept for the
//!   process lifetime
//! - Strictly sequential execution within a queue, full concurrency across
//!   queues
//! - Per-queue counters (`jobs_remaining`, `high_water_mark`, `is_active`)
//! - Completion callbacks for job chaining and a broadcast event stream
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pagekey_jobs::{CoordinatorConfig, JobCoordinator};
//!
//! let coordinator = JobCoordinator::new(CoordinatorConfig::from_env())?;
//! coordinator.enqueue_job(Arc::new(my_job))?;
//! coordinator.wait_until_idle().await;
//! println!("{:?}", coordinator.get_job_progress());
//! ```

pub mod coordinator;
pub mod error;
pub mod job;

pub use coordinator::{CoordinatorConfig, JobCoordinator, JobProgress, QueueEvent, QueueStats};
pub use error::JobError;
pub use job::{CompletionCallback, Job};
