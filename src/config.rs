use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::tm::TaskFailure;

/// Callback invoked on the worker thread when a task action panics
pub type FailureHook = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Configuration for a [`TaskManager`](crate::TaskManager)
#[derive(Clone)]
pub struct TaskManagerConfig {
    /// Instance name for logging and the worker thread name
    pub name: String,

    /// External hard-stop signal. Cancelling it abandons pending tasks.
    pub cancel_token: CancellationToken,

    /// Side channel for panicking task actions
    pub failure_hook: Option<FailureHook>,
}

impl TaskManagerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        TaskManagerConfig {
            name: name.into(),
            cancel_token: CancellationToken::new(),
            failure_hook: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_failure_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    pub(crate) fn thread_name(&self) -> String {
        format!("{}-worker", self.name)
    }
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        TaskManagerConfig::new("task_manager")
    }
}

impl fmt::Debug for TaskManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManagerConfig")
            .field("name", &self.name)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .field("failure_hook", &self.failure_hook.is_some())
            .finish()
    }
}
