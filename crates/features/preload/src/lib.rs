//! Resource preloading: a manifest of files with SHA-256 digests, verification of what
//! is already on disk, and retrying HTTP downloads of the rest.
//!
//! Hashing runs on the shared [`ThreadPool`]; progress is published on
//! `preload.progress`.

mod checksum;
mod error;
mod manifest;
mod preloader;

pub use checksum::{sha256_bytes, sha256_file, sha256_on};
pub use error::{PreloadError, PreloadErrorExt};
pub use manifest::{ResourceEntry, ResourceManifest};
pub use preloader::{FailedResource, PreloadReport, Preloader, PreloaderBuilder, ResourceStatus};

use lithium_domain::config::PreloadConfig;
use lithium_message_bus::MessageBus;
use lithium_runtime::ThreadPool;
use std::sync::Arc;

/// Startup hook: loads `config.manifest` and preloads it when `config.enabled`.
///
/// Returns `None` when preloading is disabled.
///
/// # Errors
/// The manifest cannot be read or parsed, or lists a path outside `config.root`.
pub async fn run(
    config: &PreloadConfig,
    pool: Arc<ThreadPool>,
    bus: &MessageBus,
) -> Result<Option<PreloadReport>, PreloadError> {
    if !config.enabled {
        tracing::debug!("Preload disabled");
        return Ok(None);
    }

    let manifest = ResourceManifest::load(&config.manifest).await?;
    let preloader = Preloader::from_config(config, pool).bus(bus.clone()).build()?;
    tracing::info!(
        resources = manifest.len(),
        root = %preloader.root().display(),
        "Preloading resources"
    );
    preloader.preload(&manifest).await.map(Some)
}
