//! # Runtime
//!
//! Execution infrastructure shared by every Lithium binary.
//!
//! * [`RuntimeConfig`] presets and builders for the [Tokio](https://tokio.rs) runtime,
//!   plus the `#[lithium_runtime::main]` attribute that wires them into `main`.
//! * [`ThreadPool`], a fixed-size pool of OS threads for blocking or CPU-heavy jobs
//!   (checksums, file parsing, driver calls) that must not stall async workers.
//!
//! ## Example
//!
//! ```rust,ignore
//! #[lithium_runtime::main(high_performance)]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = lithium_runtime::ThreadPool::new(4)?;
//!     let answer = pool.enqueue(|| 6 * 7)?.await?;
//!     assert_eq!(answer, 42);
//!     Ok(())
//! }
//! ```

mod error;
mod pool;

pub use crate::error::{PoolError, PoolErrorExt};
pub use crate::pool::{PoolStats, TaskHandle, ThreadPool, ThreadPoolBuilder};
pub use anyhow::Result;
pub use lithium_derive::main;

use anyhow::Context;
use std::num::NonZero;
use std::sync::OnceLock;
use std::thread::available_parallelism;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

const FALLBACK_WORKER_THREADS: usize = 4;
const MAX_WORKER_THREADS: usize = 1024;
/// 3 `MiB`.
const DEFAULT_STACK_SIZE: usize = 3 * 1024 * 1024;
const MIN_STACK_SIZE: usize = 1024 * 1024;
const MAX_STACK_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_THREAD_NAME: &str = "lithium-worker";
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

static WORKER_THREADS: OnceLock<usize> = OnceLock::new();
static GLOBAL_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Worker count from `TOKIO_WORKER_THREADS`, falling back to the available parallelism.
pub fn detected_worker_threads() -> usize {
    *WORKER_THREADS.get_or_init(|| {
        std::env::var("TOKIO_WORKER_THREADS")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|n| (1..=MAX_WORKER_THREADS).contains(n))
            .unwrap_or_else(|| {
                available_parallelism().map_or(FALLBACK_WORKER_THREADS, NonZero::get)
            })
    })
}

/// Tokio runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub worker_threads: usize,
    pub stack_size: usize,
    pub thread_name: String,
    pub thread_keep_alive: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: detected_worker_threads(),
            stack_size: DEFAULT_STACK_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            thread_keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

impl RuntimeConfig {
    /// Preset for the observatory server: all cores, 4 `MiB` stacks, long keep-alive.
    #[must_use]
    pub fn high_performance() -> Self {
        Self {
            stack_size: 4 * 1024 * 1024,
            thread_name: "lithium-hp".to_owned(),
            thread_keep_alive: Duration::from_secs(300),
            ..Self::default()
        }
    }

    /// Preset for small single-board computers next to the mount.
    #[must_use]
    pub fn memory_efficient() -> Self {
        Self {
            worker_threads: (detected_worker_threads() / 2).max(1),
            stack_size: 2 * 1024 * 1024,
            thread_name: "lithium-mem".to_owned(),
            thread_keep_alive: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, MAX_WORKER_THREADS);
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE);
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.thread_name =
            if name.trim().is_empty() { DEFAULT_THREAD_NAME.to_owned() } else { name };
        self
    }

    #[must_use]
    pub const fn with_thread_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.thread_keep_alive = keep_alive;
        self
    }

    /// Re-applies every clamp, for configs assembled by hand.
    fn normalized(&self) -> Self {
        self.clone()
            .with_worker_threads(self.worker_threads)
            .with_stack_size(self.stack_size)
            .with_thread_name(self.thread_name.clone())
    }
}

/// Builds a multi-threaded runtime from `config` with every driver (I/O, time) enabled.
///
/// # Errors
/// Returns an error if the OS refuses to spawn the worker threads.
pub fn build_runtime_with_config(config: &RuntimeConfig) -> Result<Runtime> {
    let config = config.normalized();
    debug!(?config, "Building tokio runtime");

    Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name(&config.thread_name)
        .thread_stack_size(config.stack_size)
        .thread_keep_alive(config.thread_keep_alive)
        .enable_all()
        .build()
        .context("Failed to initialize tokio runtime")
}

/// Builds a runtime with the default preset and a custom stack size.
///
/// # Errors
/// See [`build_runtime_with_config`].
pub fn build_runtime(stack_size: usize) -> Result<Runtime> {
    build_runtime_with_config(&RuntimeConfig::default().with_stack_size(stack_size))
}

/// Builds a runtime with the default preset.
///
/// # Errors
/// See [`build_runtime_with_config`].
pub fn build_service_runtime() -> Result<Runtime> {
    let config = RuntimeConfig::default();
    info!(threads = config.worker_threads, stack = config.stack_size, "Initializing service runtime");
    build_runtime_with_config(&config)
}

/// Lazily initialized process-wide runtime for code running outside any async context.
///
/// # Panics
/// Panics if the runtime cannot be created; the process cannot do anything useful then.
pub fn get_global_runtime() -> &'static Runtime {
    GLOBAL_RUNTIME.get_or_init(|| {
        build_service_runtime().expect("CRITICAL: failed to initialize the global runtime")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_threads_are_clamped() {
        assert_eq!(RuntimeConfig::default().with_worker_threads(0).worker_threads, 1);
        assert_eq!(RuntimeConfig::default().with_worker_threads(5000).worker_threads, 1024);
    }

    #[test]
    fn stack_size_is_clamped() {
        assert_eq!(RuntimeConfig::default().with_stack_size(1).stack_size, MIN_STACK_SIZE);
        assert_eq!(RuntimeConfig::default().with_stack_size(usize::MAX).stack_size, MAX_STACK_SIZE);
    }

    #[test]
    fn blank_thread_name_falls_back() {
        let config = RuntimeConfig::default().with_thread_name("   ");
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn hand_built_config_is_normalized() {
        let raw = RuntimeConfig {
            worker_threads: 0,
            stack_size: 0,
            thread_name: String::new(),
            thread_keep_alive: Duration::ZERO,
        };
        let normalized = raw.normalized();
        assert_eq!(normalized.worker_threads, 1);
        assert_eq!(normalized.stack_size, MIN_STACK_SIZE);
        assert_eq!(normalized.thread_name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn global_runtime_is_a_singleton() {
        let first = std::ptr::from_ref(get_global_runtime());
        let second = std::ptr::from_ref(get_global_runtime());
        assert_eq!(first, second);
    }
}
