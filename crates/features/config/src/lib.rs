//! Config feature slice: a JSON document store with path access, deep merge,
//! structural diff and atomic persistence, plus the `/api/config` routes
//! (feature `server`).
//!
//! ```rust
//! use lithium_config::ConfigManager;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), lithium_config::ConfigError> {
//! let config = ConfigManager::new();
//! config.set("camera/gain", json!(120))?;
//! config.merge(json!({ "camera": { "offset": 10 } }));
//!
//! assert_eq!(config.get_as::<u32>("camera.gain")?, Some(120));
//! assert_eq!(config.keys(), vec!["camera/gain", "camera/offset"]);
//! # Ok(())
//! # }
//! ```

mod error;
pub mod json;
mod manager;
mod path;
#[cfg(feature = "server")]
pub mod routes;

pub use error::{ConfigError, ConfigErrorExt};
pub use json::{JsonChange, json_diff};
pub use manager::{ConfigManager, ConfigManagerBuilder};
pub use path::ConfigPath;

use lithium_domain::config::AppConfig;
use lithium_kernel::domain::registry::InitializedSlice;
use lithium_kernel::sandbox;
use lithium_message_bus::MessageBus;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config feature state
#[lithium_derive::lithium_slice]
pub struct ConfigStore {
    pub manager: Arc<ConfigManager>,
    /// Target of `save` when no file is given.
    pub default_file: Option<PathBuf>,
    /// Relative paths from requests resolve inside this directory.
    pub root: PathBuf,
}

impl ConfigStoreInner {
    /// Resolves a requested file: `None` means the default file, anything else must
    /// stay inside [`root`](Self::root).
    ///
    /// # Errors
    /// [`ConfigError::NotFound`] when no default file is configured;
    /// [`ConfigError::Sandbox`] for paths escaping the root.
    pub fn resolve(&self, requested: Option<&str>) -> Result<PathBuf, ConfigError> {
        match requested {
            Some(relative) => Ok(sandbox::resolve(&self.root, relative)?),
            None => self.default_file.clone().ok_or_else(|| ConfigError::NotFound {
                message: "no store.file configured".into(),
                context: None,
            }),
        }
    }
}

/// Builds the config store from `config.store`: loads `store.dir`, then `store.file`
/// at the root if it exists, then turns on autosave when requested.
///
/// # Errors
/// A document that exists but cannot be read or parsed.
pub async fn init(
    config: &AppConfig,
    bus: &MessageBus,
) -> Result<(InitializedSlice, Arc<ConfigManager>), ConfigError> {
    let store = &config.store;
    let mut builder = ConfigManager::builder().bus(bus.clone());
    if let (true, Some(file)) = (store.autosave, &store.file) {
        builder = builder.autosave(file.clone());
    }

    // Loading happens before autosave is armed so startup does not rewrite the file.
    let loader = ConfigManager::new();
    if let Some(dir) = store.dir.as_deref().filter(|d| d.is_dir()) {
        loader.load_dir(dir, true).await.context("Loading store.dir")?;
    }
    if let Some(file) = store.file.as_deref().filter(|f| f.is_file()) {
        loader.load_file_at_root(file).await.context("Loading store.file")?;
    }
    let manager = Arc::new(builder.document(loader.snapshot()).build());

    let root = store
        .dir
        .clone()
        .or_else(|| {
            store
                .file
                .as_deref()
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| PathBuf::from("."));

    tracing::info!(keys = manager.keys().len(), root = %root.display(), "Config slice initialized");

    let slice = ConfigStore::new(ConfigStoreInner {
        manager: Arc::clone(&manager),
        default_file: store.file.clone(),
        root,
    });
    Ok((InitializedSlice::new(slice), manager))
}
