//! Fixed-size worker pool over a shared FIFO queue.
//!
//! Workers block on a [`Condvar`] until a job arrives. Every accepted job gets a
//! [`TaskHandle`] that resolves exactly once: with the job's value, with
//! [`PoolError::TaskPanicked`] if it panicked, or with [`PoolError::Cancelled`] if the
//! pool discarded it during [`ThreadPool::shutdown_now`].

use crate::error::PoolError;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_THREAD_NAME: &str = "lithium-pool";
const MAX_THREADS: usize = 1024;

/// Point-in-time counters of a [`ThreadPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub threads: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    active: usize,
    stopping: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a job is queued or the pool starts stopping.
    job_ready: Condvar,
    /// Signalled when a slot frees up in a bounded queue.
    slot_free: Condvar,
    /// Async counterpart of `slot_free`, also woken on stop.
    slot_notify: Notify,
    /// Signalled when the pool becomes idle.
    drained: Condvar,
    capacity: Option<usize>,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    fn is_full(&self, state: &State) -> bool {
        self.capacity.is_some_and(|cap| state.queue.len() >= cap)
    }
}

/// Builder for [`ThreadPool`].
#[derive(Debug, Clone)]
#[must_use = "call .build() to spawn the workers"]
pub struct ThreadPoolBuilder {
    threads: usize,
    queue_capacity: usize,
    thread_name: String,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self {
            threads: crate::detected_worker_threads(),
            queue_capacity: 0,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl ThreadPoolBuilder {
    /// Number of worker threads, clamped to `1..=1024`.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.clamp(1, MAX_THREADS);
        self
    }

    /// Maximum number of queued (not yet running) jobs. `0` means unbounded.
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Prefix for worker thread names (`<prefix>-<index>`).
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.thread_name = name;
        }
        self
    }

    /// Spawns the workers.
    ///
    /// # Errors
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be created. Workers that
    /// were already started are stopped and joined before returning.
    pub fn build(self) -> Result<ThreadPool, PoolError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            job_ready: Condvar::new(),
            slot_free: Condvar::new(),
            slot_notify: Notify::new(),
            drained: Condvar::new(),
            capacity: (self.queue_capacity > 0).then_some(self.queue_capacity),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let pool = ThreadPool {
            shared,
            workers: Mutex::new(Vec::with_capacity(self.threads)),
            size: self.threads,
        };

        for index in 0..self.threads {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", self.thread_name))
                .spawn(move || worker_loop(&shared));

            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(PoolError::Spawn {
                        message: e.to_string().into(),
                        context: Some(format!("worker {index} of {}", self.threads).into()),
                    });
                },
            }
        }

        debug!(threads = self.threads, capacity = ?pool.shared.capacity, "Thread pool started");
        Ok(pool)
    }
}

/// A fixed-size pool of OS threads.
///
/// Dropping the pool performs a graceful [`shutdown`](ThreadPool::shutdown).
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

impl ThreadPool {
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::default()
    }

    /// Creates an unbounded pool with `threads` workers.
    ///
    /// # Errors
    /// See [`ThreadPoolBuilder::build`].
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        Self::builder().threads(threads).build()
    }

    /// Queues `job` and returns a handle to its result.
    ///
    /// Blocks while a bounded queue is full.
    ///
    /// # Errors
    /// Returns [`PoolError::Stopped`] once shutdown has begun.
    pub fn enqueue<F, T>(&self, job: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = wrap(job);
        self.push(job, true)?;
        Ok(handle)
    }

    /// Like [`enqueue`](Self::enqueue), but waits for a free slot without blocking the
    /// calling runtime thread. Use this from async code when the queue is bounded.
    ///
    /// # Errors
    /// Returns [`PoolError::Stopped`] once shutdown has begun, including while waiting.
    pub async fn enqueue_async<F, T>(&self, job: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (mut job, handle) = wrap(job);
        loop {
            // Registered before the check so a slot freed in between still wakes us.
            let mut slot = pin!(self.shared.slot_notify.notified());
            slot.as_mut().enable();
            match self.offer(job)? {
                None => return Ok(handle),
                Some(rejected) => job = rejected,
            }
            slot.await;
        }
    }

    /// Like [`enqueue`](Self::enqueue) but never blocks.
    ///
    /// # Errors
    /// Returns [`PoolError::QueueFull`] when a bounded queue is full and
    /// [`PoolError::Stopped`] once shutdown has begun.
    pub fn try_enqueue<F, T>(&self, job: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = wrap(job);
        self.push(job, false)?;
        Ok(handle)
    }

    /// Queues a job whose result nobody waits for. Panics are counted and logged.
    ///
    /// # Errors
    /// Returns [`PoolError::Stopped`] once shutdown has begun.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(job), true)
    }

    /// Blocks until the queue is empty and no job is running.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while !state.queue.is_empty() || state.active > 0 {
            self.shared.drained.wait(&mut state);
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.shared.state.lock().active
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopping
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (queued, active) = {
            let state = self.shared.state.lock();
            (state.queue.len(), state.active)
        };
        PoolStats {
            threads: self.size,
            queued,
            active,
            completed: self.shared.completed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting jobs, runs everything already queued, then joins the workers.
    ///
    /// Idempotent. Safe to call from a worker thread (that worker is not joined).
    pub fn shutdown(&self) {
        self.begin_stop(false);
        self.join_workers();
    }

    /// Stops accepting jobs, discards the queue, then joins the workers.
    ///
    /// Handles of discarded jobs resolve to [`PoolError::Cancelled`].
    pub fn shutdown_now(&self) {
        let discarded = self.begin_stop(true);
        if discarded > 0 {
            warn!(discarded, "Thread pool discarded queued jobs");
        }
        self.join_workers();
    }

    /// Queues `job` unless the queue is full, in which case it is handed back.
    fn offer(&self, job: Job) -> Result<Option<Job>, PoolError> {
        let mut state = self.shared.state.lock();
        if state.stopping {
            return Err(stopped());
        }
        if self.shared.is_full(&state) {
            return Ok(Some(job));
        }
        state.queue.push_back(job);
        trace!(queued = state.queue.len(), "Job queued");
        drop(state);
        self.shared.job_ready.notify_one();
        Ok(None)
    }

    fn push(&self, job: Job, block: bool) -> Result<(), PoolError> {
        let mut state = self.shared.state.lock();
        loop {
            if state.stopping {
                return Err(stopped());
            }
            if !self.shared.is_full(&state) {
                break;
            }
            if !block {
                return Err(PoolError::QueueFull {
                    message: format!("{} jobs queued", state.queue.len()).into(),
                    context: None,
                });
            }
            self.shared.slot_free.wait(&mut state);
        }

        state.queue.push_back(job);
        trace!(queued = state.queue.len(), "Job queued");
        drop(state);
        self.shared.job_ready.notify_one();
        Ok(())
    }

    fn begin_stop(&self, discard: bool) -> usize {
        let discarded: Vec<Job> = {
            let mut state = self.shared.state.lock();
            state.stopping = true;
            if discard { state.queue.drain(..).collect() } else { Vec::new() }
        };
        self.shared.job_ready.notify_all();
        self.shared.slot_free.notify_all();
        self.shared.slot_notify.notify_waiters();
        self.shared.drained.notify_all();

        // Dropping the jobs drops their result senders, which cancels the handles.
        let count = discarded.len();
        drop(discarded);
        count
    }

    fn join_workers(&self) {
        let current: ThreadId = thread::current().id();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("Thread pool worker terminated abnormally");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.active += 1;
                    break job;
                }
                if state.stopping {
                    return;
                }
                shared.job_ready.wait(&mut state);
            }
        };
        shared.slot_free.notify_one();
        shared.slot_notify.notify_waiters();

        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => shared.completed.fetch_add(1, Ordering::Relaxed),
            Err(payload) => {
                warn!(reason = %panic_message(payload.as_ref()), "Thread pool job panicked");
                shared.panicked.fetch_add(1, Ordering::Relaxed)
            },
        };

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.active == 0 && state.queue.is_empty() {
            shared.drained.notify_all();
        }
    }
}

/// Wraps a value-returning job so that its outcome (value or panic) reaches the handle.
fn wrap<F, T>(job: F) -> (Job, TaskHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job: Job = Box::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
            PoolError::TaskPanicked { message: panic_message(payload.as_ref()).into(), context: None }
        });
        let panicked = outcome.is_err();
        // A dropped handle is fine, the caller lost interest.
        let _ = tx.send(outcome);
        if panicked {
            // Re-raise so the worker's counters see it; the handle already has the error.
            std::panic::resume_unwind(Box::new("task panicked"));
        }
    });
    (job, TaskHandle { rx })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}

/// Result of a job queued on a [`ThreadPool`].
///
/// Await it from async code, or call [`join`](TaskHandle::join) from a plain thread.
#[derive(Debug)]
#[must_use = "dropping the handle discards the job's result"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, PoolError>>,
}

impl<T> TaskHandle<T> {
    /// Blocks the current thread until the job finishes.
    ///
    /// # Errors
    /// [`PoolError::TaskPanicked`] or [`PoolError::Cancelled`].
    ///
    /// # Panics
    /// Panics when called from inside an async runtime; await the handle there instead.
    pub fn join(self) -> Result<T, PoolError> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(cancelled()))
    }

    /// Returns the result if the job already finished, without blocking.
    pub fn try_join(&mut self) -> Option<Result<T, PoolError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(cancelled())),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| received.unwrap_or_else(|_| Err(cancelled())))
    }
}

fn stopped() -> PoolError {
    PoolError::Stopped { message: "job rejected".into(), context: None }
}

fn cancelled() -> PoolError {
    PoolError::Cancelled { message: "job dropped before it ran".into(), context: None }
}
