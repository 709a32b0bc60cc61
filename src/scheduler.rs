//! Asynchronous task scheduling for callback delivery
//!
//! Every observable side effect in this crate - event dispatch, deferred
//! resolution, fan-in aggregation - goes through a [`Scheduler`]. The
//! contract is small: accept a zero-argument unit of work, run it later,
//! never synchronously within the caller's execution, and preserve
//! submission order (FIFO) relative to other work given to the same
//! scheduler.
//!
//! Two implementations are provided. [`TaskQueue`] is a deterministic
//! single-threaded queue that callers drain explicitly - this is what the
//! test suites use to make asynchronous behavior observable step by step.
//! [`TokioScheduler`] forwards tasks to a single worker on a tokio runtime,
//! which preserves FIFO by having exactly one consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// A zero-argument unit of work accepted by a scheduler
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a scheduler
pub type SchedulerHandle = Arc<dyn Scheduler>;

/// The deferral contract all callback delivery runs through
///
/// Implementations must execute submitted tasks asynchronously with respect
/// to the submitter, in submission order, and must not panic for valid input.
pub trait Scheduler: Send + Sync {
    /// Submit a unit of work for later execution
    fn schedule(&self, task: Task);
}

/// Deterministic FIFO task queue
///
/// Scheduling only enqueues; nothing runs until a caller drains the queue.
/// Tasks enqueued by running tasks are picked up in the same drain, so a
/// single [`run_until_idle`](TaskQueue::run_until_idle) observes every
/// transitively scheduled effect.
#[derive(Default)]
pub struct TaskQueue {
    queue: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    /// Create a new empty task queue
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a queue already wrapped for sharing
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of tasks currently waiting
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Run the next pending task, if any
    ///
    /// Returns `true` if a task ran. The queue lock is not held while the
    /// task executes, so tasks are free to schedule more work.
    pub fn run_next(&self) -> bool {
        let task = self.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks in FIFO order until the queue is empty
    ///
    /// Returns the number of tasks executed, including tasks that were
    /// scheduled by tasks run during this drain.
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        while self.run_next() {
            executed += 1;
        }
        tracing::trace!(executed, "task queue drained");
        executed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.lock().push_back(task);
    }
}

/// Scheduler backed by a tokio runtime
///
/// Tasks are forwarded over an unbounded channel to a single spawned worker.
/// One consumer means submission order is execution order, which is the
/// FIFO guarantee the rest of the crate relies on.
pub struct TokioScheduler {
    sender: tokio::sync::mpsc::UnboundedSender<Task>,
}

impl TokioScheduler {
    /// Spawn the drain worker on the current tokio runtime
    ///
    /// Must be called from within a runtime context. The worker exits when
    /// every handle to this scheduler has been dropped.
    pub fn spawn() -> Arc<Self> {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Task>();
        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
            tracing::debug!("tokio scheduler worker stopped");
        });
        Arc::new(Self { sender })
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            // Worker already shut down; dropping the task is the only
            // non-panicking option left.
            tracing::warn!("tokio scheduler worker gone, task dropped");
        }
    }
}

/// Process-wide default scheduler
///
/// Used when an instance is constructed without an injected scheduler. The
/// default is a [`TaskQueue`], so embedders that rely on it must drain
/// [`default_queue`] themselves.
pub fn default_scheduler() -> SchedulerHandle {
    default_queue()
}

/// The [`TaskQueue`] behind [`default_scheduler`], exposed so it can be drained
pub fn default_queue() -> Arc<TaskQueue> {
    static DEFAULT: OnceLock<Arc<TaskQueue>> = OnceLock::new();
    DEFAULT.get_or_init(TaskQueue::shared).clone()
}
