use std::borrow::Cow;

/// Errors reported by the [`ThreadPool`](crate::ThreadPool).
#[lithium_derive::lithium_error]
#[derive(PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down and no longer accepts jobs.
    #[error("Thread pool stopped{}: {message}", format_context(.context))]
    Stopped { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A bounded queue is at capacity (only returned by `try_enqueue`).
    #[error("Thread pool queue full{}: {message}", format_context(.context))]
    QueueFull { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The job panicked; the worker thread survived.
    #[error("Task panicked{}: {message}", format_context(.context))]
    TaskPanicked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The job was discarded before it ran.
    #[error("Task cancelled{}: {message}", format_context(.context))]
    Cancelled { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A worker thread could not be spawned.
    #[error("Failed to spawn worker{}: {message}", format_context(.context))]
    Spawn { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
