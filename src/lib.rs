//! # Timer Queue
//!
//! A time-ordered task scheduler backed by a priority queue, plus a sliding-TTL cache
//! built directly on top of it.
//!
//! Each [`TaskManager`] owns one dedicated worker thread that sleeps until the earliest
//! pending task is due, runs it, and repeats.
//!
//! ## Features
//!
//! - **Preemption**: submitting a task that is due sooner than the one being waited on
//!   wakes the worker early
//! - **Lazy Cancellation**: cancelled tasks are discarded when they reach the front of the
//!   queue, and a cancelled task never runs
//! - **Panic Isolation**: a panicking task is logged and reported, the worker keeps going
//! - **Graceful Shutdown**: `shutdown` drains the queue before stopping, and a
//!   [`CancellationToken`] provides a hard stop
//! - **TTL Cache**: every read of a [`TtlCache`] entry pushes its expiration forward
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::mpsc;
//! use timer_queue::{Duration, TaskManager, TtlCache};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TaskManager::new("my_task_manager")?;
//!
//!     let (tx, rx) = mpsc::channel();
//!     let handle = manager.submit_after(move || tx.send("fired").unwrap(), Duration::from_millis(20))?;
//!     assert_eq!(rx.recv()?, "fired");
//!     assert!(!manager.cancel(&handle));
//!
//!     // Blocks until the queue is empty
//!     manager.shutdown();
//!
//!     let cache = TtlCache::new("my_cache")?;
//!     cache.add("session", 42, Duration::from_secs(30))?;
//!     assert_eq!(cache.get("session"), Some(42));
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod pq;
mod tm;

pub use cache::TtlCache;
pub use config::{FailureHook, TaskManagerConfig};
pub use error::{CacheError, QueueError, SchedulerError};
pub use pq::OrderedQueue;
pub use tm::{ScheduledTask, TaskFailure, TaskHandle, TaskId, TaskManager, TaskState};

// Re-export commonly used types for convenience
pub use std::time::{Duration, Instant};
pub use tokio_util::sync::CancellationToken;
