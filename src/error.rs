use thiserror::Error;

/// Errors raised by [`OrderedQueue`](crate::OrderedQueue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
}

/// Errors raised by [`TaskManager`](crate::TaskManager)
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Submission after shutdown began or after a hard stop
    #[error("task manager '{name}' is stopped")]
    ManagerStopped { name: String },

    /// The worker thread or its timer runtime could not be created
    #[error("failed to start task manager worker: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Errors raised by [`TtlCache`](crate::TtlCache)
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("key '{0}' already exists")]
    DuplicateKey(String),

    #[error("failed to arrange cache expiration: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl SchedulerError {
    pub fn is_stopped(&self) -> bool {
        matches!(self, SchedulerError::ManagerStopped { .. })
    }
}
