use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::ptr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::{FailureHook, TaskManagerConfig};
use crate::error::SchedulerError;
use crate::pq::OrderedQueue;

/// Identifier of a submitted task, unique per manager
pub type TaskId = u64;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Lifecycle of a submitted task. `Fired` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Fired,
    Cancelled,
}

/// Reported when a task action panics
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub message: String,
}

/// A typed task carrying its own due time
pub trait ScheduledTask: Send + 'static {
    fn due_at(&self) -> Instant;

    fn run(self)
    where
        Self: Sized;
}

/// Shared state of one task. Transitions only happen under the manager lock.
#[derive(Debug)]
struct TaskCell {
    id: TaskId,
    state: AtomicU8,
    /// Manager whose lock guards `state`
    owner: Weak<Shared>,
}

impl TaskCell {
    fn owned_by(&self, shared: &Arc<Shared>) -> bool {
        ptr::eq(self.owner.as_ptr(), Arc::as_ptr(shared))
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn load(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            PENDING => TaskState::Pending,
            FIRED => TaskState::Fired,
            _ => TaskState::Cancelled,
        }
    }
}

/// Opaque handle to a submitted task, used for cancellation
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cell: Arc<TaskCell>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn state(&self) -> TaskState {
        self.cell.load()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }
}

type Action = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    due_at: Instant,
    cell: Arc<TaskCell>,
    action: Action,
}

fn due_before(a: &QueuedTask, b: &QueuedTask) -> bool {
    a.due_at < b.due_at
}

type TaskQueue = OrderedQueue<QueuedTask, fn(&QueuedTask, &QueuedTask) -> bool>;

struct State {
    queue: TaskQueue,
    next_id: TaskId,
    /// An action is executing on the worker
    running: bool,
    /// Set at most once; no submissions afterwards
    stopped: bool,
}

/// What the worker does next, decided under the lock
enum Step {
    Idle,
    Sleep(Instant),
    Run(QueuedTask),
    Exit,
}

struct Shared {
    name: String,
    state: Mutex<State>,
    /// Signalled when the queue drains with nothing running
    drained: Condvar,
    /// Queue went from empty to non-empty, or the manager stopped
    queue_ready: Notify,
    /// A new minimum arrived while the worker may be sleeping
    interrupt: Notify,
    stop_token: CancellationToken,
    failure_hook: Option<FailureHook>,
}

/// Time-ordered task scheduler driven by one dedicated worker thread
pub struct TaskManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl TaskManager {
    /// Create a manager with default configuration and start its worker
    pub fn new(name: impl Into<String>) -> Result<Self, SchedulerError> {
        Self::with_config(TaskManagerConfig::new(name))
    }

    /// Create a manager and start its worker thread
    pub fn with_config(config: TaskManagerConfig) -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let thread_name = config.thread_name();
        let shared = Arc::new(Shared {
            name: config.name,
            state: Mutex::new(State {
                queue: OrderedQueue::new(due_before as fn(&QueuedTask, &QueuedTask) -> bool),
                next_id: 1,
                running: false,
                stopped: false,
            }),
            drained: Condvar::new(),
            queue_ready: Notify::new(),
            interrupt: Notify::new(),
            stop_token: config.cancel_token.child_token(),
            failure_hook: config.failure_hook,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_main(runtime, worker_shared))?;
        let worker_id = worker.thread().id();

        Ok(TaskManager {
            shared,
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Schedule `action` to run at `due_at`
    ///
    /// If the new task becomes the earliest one, the worker's current sleep
    /// is interrupted so it can wait for the new deadline instead.
    pub fn submit<A>(&self, action: A, due_at: Instant) -> Result<TaskHandle, SchedulerError>
    where
        A: FnOnce() + Send + 'static,
    {
        self.shared.submit(Box::new(action), due_at)
    }

    /// Schedule `action` to run after `delay`
    pub fn submit_after<A>(&self, action: A, delay: Duration) -> Result<TaskHandle, SchedulerError>
    where
        A: FnOnce() + Send + 'static,
    {
        self.submit(action, Instant::now() + delay)
    }

    /// Schedule a typed task at its own due time
    pub fn submit_task<T: ScheduledTask>(&self, task: T) -> Result<TaskHandle, SchedulerError> {
        let due_at = task.due_at();
        self.submit(move || task.run(), due_at)
    }

    /// Mark a task cancelled
    ///
    /// Returns false if it already fired, was already cancelled, or was
    /// submitted to a different manager. The entry stays queued and is
    /// discarded when it reaches the front.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        if !handle.cell.owned_by(&self.shared) {
            log::warn!(
                "Task {} does not belong to manager '{}', not cancelled",
                handle.id(),
                self.shared.name
            );
            return false;
        }

        let _state = self.shared.lock_state();
        let cancelled = handle.cell.transition(CANCELLED);
        if cancelled {
            log::debug!(
                "Task {} cancelled in manager '{}'",
                handle.id(),
                self.shared.name
            );
        }
        cancelled
    }

    /// Wait until every queued task is done, then stop the manager
    ///
    /// Safe to call more than once. Called from inside a task action it only
    /// sets the stopped flag; the worker still drains the queue before exiting.
    pub fn shutdown(&self) {
        if thread::current().id() == self.worker_id {
            let mut state = self.shared.lock_state();
            if !state.stopped {
                state.stopped = true;
                log::info!(
                    "Task manager '{}' stopping from inside a task, draining {} task(s)",
                    self.shared.name,
                    state.queue.len()
                );
            }
            return;
        }

        {
            let mut state = self.shared.lock_state();
            while !state.queue.is_empty() || state.running {
                state = self
                    .shared
                    .drained
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !state.stopped {
                state.stopped = true;
                log::info!("Task manager '{}' shutting down", self.shared.name);
            }
        }

        self.shared.queue_ready.notify_one();
        self.join_worker();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Number of queued entries, including cancelled ones not yet discarded
    pub fn len(&self) -> usize {
        self.shared.lock_state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join_worker(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("Task manager '{}' worker panicked", self.shared.name);
            }
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shared.stop_token.cancel();
        if thread::current().id() != self.worker_id {
            self.join_worker();
        }
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("TaskManager")
            .field("name", &self.shared.name)
            .field("queued", &state.queue.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}

fn worker_main(runtime: Runtime, shared: Arc<Shared>) {
    runtime.block_on(shared.run());
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stopped(&self) -> bool {
        self.stop_token.is_cancelled() || self.lock_state().stopped
    }

    fn stopped_error(&self) -> SchedulerError {
        SchedulerError::ManagerStopped {
            name: self.name.clone(),
        }
    }

    fn submit(self: &Arc<Self>, action: Action, due_at: Instant) -> Result<TaskHandle, SchedulerError> {
        if self.stop_token.is_cancelled() {
            return Err(self.stopped_error());
        }

        let mut state = self.lock_state();
        if state.stopped || self.stop_token.is_cancelled() {
            return Err(self.stopped_error());
        }

        let id = state.next_id;
        state.next_id += 1;
        let cell = Arc::new(TaskCell {
            id,
            state: AtomicU8::new(PENDING),
            owner: Arc::downgrade(self),
        });

        let len_before = state.queue.len();
        state.queue.insert(QueuedTask {
            due_at,
            cell: Arc::clone(&cell),
            action,
        });
        let new_minimum = state
            .queue
            .peek_min()
            .map(|head| Arc::ptr_eq(&head.cell, &cell))
            .unwrap_or(false);
        drop(state);

        if len_before == 0 {
            self.queue_ready.notify_one();
        } else if new_minimum {
            log::trace!("Task {} preempts the current wait in '{}'", id, self.name);
            self.interrupt.notify_one();
        }

        Ok(TaskHandle { cell })
    }

    async fn run(self: Arc<Self>) {
        log::info!("Task manager '{}' started", self.name);

        loop {
            if self.stop_token.is_cancelled() {
                self.abandon_pending();
                break;
            }

            match self.next_step() {
                Step::Exit => break,
                Step::Idle => {
                    tokio::select! {
                        biased;
                        _ = self.stop_token.cancelled() => {}
                        _ = self.queue_ready.notified() => {}
                    }
                }
                Step::Sleep(due_at) => {
                    tokio::select! {
                        biased;
                        _ = self.stop_token.cancelled() => {}
                        _ = self.interrupt.notified() => {
                            log::trace!("Task manager '{}' woke early for a new head", self.name);
                        }
                        _ = tokio::time::sleep_until(due_at.into()) => {}
                    }
                }
                Step::Run(task) => {
                    self.execute(task);
                    let mut state = self.lock_state();
                    state.running = false;
                    self.notify_if_drained(&state);
                }
            }
        }

        log::info!("Task manager '{}' stopped", self.name);
    }

    /// Pick the next step, discarding cancelled heads on the way
    fn next_step(&self) -> Step {
        let mut state = self.lock_state();
        loop {
            let (due_at, cancelled) = match state.queue.peek_min() {
                Ok(head) => (head.due_at, head.cell.load() == TaskState::Cancelled),
                Err(_) => {
                    return if state.stopped { Step::Exit } else { Step::Idle };
                }
            };

            if !cancelled && due_at > Instant::now() {
                return Step::Sleep(due_at);
            }

            let Ok(task) = state.queue.remove_min() else {
                continue;
            };
            if task.cell.transition(FIRED) {
                state.running = true;
                return Step::Run(task);
            }

            log::trace!(
                "Discarding cancelled task {} in '{}'",
                task.cell.id,
                self.name
            );
            self.notify_if_drained(&state);
        }
    }

    fn execute(&self, task: QueuedTask) {
        let QueuedTask { cell, action, .. } = task;
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) else {
            return;
        };

        let failure = TaskFailure {
            task_id: cell.id,
            message: panic_message(payload.as_ref()),
        };
        log::error!(
            "Task {} in manager '{}' panicked: {}",
            failure.task_id,
            self.name,
            failure.message
        );

        if let Some(hook) = &self.failure_hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(&failure))).is_err() {
                log::error!("Failure hook of manager '{}' panicked", self.name);
            }
        }
    }

    fn notify_if_drained(&self, state: &State) {
        if state.queue.is_empty() && !state.running {
            self.drained.notify_all();
        }
    }

    fn abandon_pending(&self) {
        let abandoned: Vec<QueuedTask> = {
            let mut state = self.lock_state();
            state.stopped = true;
            let tasks: Vec<QueuedTask> = state.queue.drain().collect();
            for task in &tasks {
                task.cell.transition(CANCELLED);
            }
            self.drained.notify_all();
            tasks
        };

        log::info!(
            "Task manager '{}' cancelled via token, abandoned {} task(s)",
            self.name,
            abandoned.len()
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
