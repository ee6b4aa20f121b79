//! Coordinator errors.

use thiserror::Error;

/// Errors raised when submitting work to the coordinator.
///
/// A job's own failure is never reported here; it is logged by the queue
/// worker and handed to the completion callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The queue's fixed dispatch capacity is exhausted.
    #[error("queue {queue} is saturated (capacity {capacity})")]
    QueueSaturated { queue: String, capacity: usize },

    /// The queue worker is gone and can no longer accept jobs.
    #[error("queue {queue} is closed")]
    QueueClosed { queue: String },

    /// The coordinator was created outside a tokio runtime.
    #[error("no tokio runtime available to run queue workers")]
    NoRuntime,
}

impl From<JobError> for pagekey_core::Error {
    fn from(e: JobError) -> Self {
        pagekey_core::Error::Job(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = JobError::QueueSaturated {
            queue: "my_page".to_string(),
            capacity: 4,
        };
        assert_eq!(err.to_string(), "queue my_page is saturated (capacity 4)");
    }

    #[test]
    fn test_into_core_error() {
        let err: pagekey_core::Error = JobError::NoRuntime.into();
        assert!(matches!(err, pagekey_core::Error::Job(_)));
    }
}
