use crate::error::{ConfigError, ConfigErrorExt};
use crate::json::{self, JsonChange};
use crate::path::ConfigPath;
use lithium_domain::constants::topics;
use lithium_domain::events::{ConfigAction, ConfigChanged};
use lithium_message_bus::MessageBus;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Document {
    value: RwLock<Value>,
    /// Bumped on every mutation.
    version: AtomicU64,
    /// Version last written by autosave or `save`.
    saved: tokio::sync::Mutex<u64>,
    tmp_counter: AtomicU64,
}

/// A single JSON document behind a read/write lock.
///
/// Mutations publish [`ConfigChanged`] on `config.changed` when a bus is attached and,
/// with autosave enabled, schedule a write of the whole document.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    doc: Arc<Document>,
    bus: Option<MessageBus>,
    autosave: Option<Arc<PathBuf>>,
}

#[derive(Debug, Default)]
pub struct ConfigManagerBuilder {
    bus: Option<MessageBus>,
    autosave: Option<PathBuf>,
    document: Option<Value>,
}

impl ConfigManagerBuilder {
    #[must_use]
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Writes the document to `path` after every mutation.
    #[must_use]
    pub fn autosave(mut self, path: impl Into<PathBuf>) -> Self {
        self.autosave = Some(path.into());
        self
    }

    /// Initial document; defaults to an empty object.
    #[must_use]
    pub fn document(mut self, value: Value) -> Self {
        self.document = Some(value);
        self
    }

    #[must_use]
    pub fn build(self) -> ConfigManager {
        ConfigManager {
            doc: Arc::new(Document {
                value: RwLock::new(self.document.unwrap_or_else(|| Value::Object(Map::new()))),
                version: AtomicU64::new(0),
                saved: tokio::sync::Mutex::new(0),
                tmp_counter: AtomicU64::new(0),
            }),
            bus: self.bus,
            autosave: self.autosave.map(Arc::new),
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> ConfigManagerBuilder {
        ConfigManagerBuilder::default()
    }

    #[must_use]
    pub fn autosave_path(&self) -> Option<&Path> {
        self.autosave.as_deref().map(PathBuf::as_path)
    }

    /// # Errors
    /// [`ConfigError::InvalidPath`].
    pub fn get(&self, path: &str) -> Result<Option<Value>, ConfigError> {
        let path = ConfigPath::parse(path)?;
        Ok(json::pointer(&self.doc.value.read(), &path).cloned())
    }

    /// Deserializes the value at `path`.
    ///
    /// # Errors
    /// [`ConfigError::InvalidPath`], or [`ConfigError::Json`] when the value has the wrong
    /// shape.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        self.get(path)?
            .map(serde_json::from_value)
            .transpose()
            .context(format!("Reading '{path}'"))
    }

    /// `false` for missing keys and malformed paths alike.
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        ConfigPath::parse(path).is_ok_and(|p| json::pointer(&self.doc.value.read(), &p).is_some())
    }

    /// # Errors
    /// [`ConfigError::InvalidPath`], [`ConfigError::TypeConflict`] or
    /// [`ConfigError::IndexOutOfRange`].
    pub fn set(&self, path: &str, value: Value) -> Result<(), ConfigError> {
        let path = ConfigPath::parse(path)?;
        json::set(&mut self.doc.value.write(), &path, value)?;
        self.changed(&path, ConfigAction::Set);
        Ok(())
    }

    /// Removes the value at `path`; returns whether it existed.
    ///
    /// # Errors
    /// [`ConfigError::InvalidPath`].
    pub fn delete(&self, path: &str) -> Result<bool, ConfigError> {
        let path = ConfigPath::parse(path)?;
        let removed = json::remove(&mut self.doc.value.write(), &path).is_some();
        if removed {
            self.changed(&path, ConfigAction::Delete);
        }
        Ok(removed)
    }

    /// Deep-merges `patch` into the document root.
    pub fn merge(&self, patch: Value) {
        json::merge(&mut self.doc.value.write(), patch);
        self.changed(&ConfigPath::root(), ConfigAction::Merge);
    }

    /// Changes that would turn the current document into `other`.
    #[must_use]
    pub fn diff(&self, other: &Value) -> Vec<JsonChange> {
        json::json_diff(&self.doc.value.read(), other)
    }

    /// Expands dotted keys throughout the document.
    pub fn tidy(&self) {
        {
            let mut doc = self.doc.value.write();
            let current = std::mem::take(&mut *doc);
            *doc = json::tidy(current);
        }
        self.changed(&ConfigPath::root(), ConfigAction::Tidy);
    }

    pub fn clear(&self) {
        *self.doc.value.write() = Value::Object(Map::new());
        self.changed(&ConfigPath::root(), ConfigAction::Clear);
    }

    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.doc.value.read().clone()
    }

    /// Leaf paths in document order, `/`-separated.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        json::leaf_paths(&self.doc.value.read())
    }

    /// Merges a JSON file under its file stem (`site.json` lands at `site`).
    ///
    /// Returns the key it was stored under.
    ///
    /// # Errors
    /// [`ConfigError::Io`], [`ConfigError::Json`], or [`ConfigError::InvalidPath`] when
    /// the file has no usable stem.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<String, ConfigError> {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::InvalidPath {
                message: format!("no file stem in {}", path.display()).into(),
                context: None,
            })?
            .to_owned();

        let value = read_json(path).await?;
        let key = ConfigPath::root().join(stem.clone());
        {
            let mut doc = self.doc.value.write();
            if doc.is_null() {
                *doc = Value::Object(Map::new());
            }
            match doc.as_object_mut() {
                Some(map) => match map.get_mut(&stem) {
                    Some(existing) => json::merge(existing, value),
                    None => {
                        map.insert(stem.clone(), value);
                    },
                },
                None => {
                    return Err(ConfigError::TypeConflict {
                        message: "document root is not an object".into(),
                        context: Some(format!("Loading {}", path.display()).into()),
                    });
                },
            }
        }
        debug!(file = %path.display(), key = %stem, "Config file loaded");
        self.changed(&key, ConfigAction::Load);
        Ok(stem)
    }

    /// Merges a JSON file into the document root.
    ///
    /// # Errors
    /// [`ConfigError::Io`] or [`ConfigError::Json`].
    pub async fn load_file_at_root(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let value = read_json(path).await?;
        json::merge(&mut self.doc.value.write(), value);
        debug!(file = %path.display(), "Config file loaded at root");
        self.changed(&ConfigPath::root(), ConfigAction::Load);
        Ok(())
    }

    /// Loads every `*.json` file of `dir` (sorted by path) with
    /// [`load_file`](Self::load_file); returns how many were loaded.
    ///
    /// # Errors
    /// [`ConfigError::Walk`] if `dir` cannot be listed, or the first file that fails to
    /// load.
    pub async fn load_dir(&self, dir: impl AsRef<Path>, recursive: bool) -> Result<usize, ConfigError> {
        let dir = dir.as_ref().to_path_buf();
        let files = tokio::task::spawn_blocking(move || json_files(&dir, recursive))
            .await
            .map_err(|e| ConfigError::Internal {
                message: e.to_string().into(),
                context: Some("Directory walk task failed".into()),
            })??;

        for file in &files {
            self.load_file(file).await?;
        }
        info!(files = files.len(), "Config directory loaded");
        Ok(files.len())
    }

    /// Writes the document as pretty JSON to `path`, atomically.
    ///
    /// # Errors
    /// [`ConfigError::Io`] or [`ConfigError::Json`].
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let mut saved = self.doc.saved.lock().await;
        let version = self.doc.version.load(Ordering::Acquire);
        let bytes = serde_json::to_vec_pretty(&*self.doc.value.read())?;
        write_atomic(path, &bytes, &self.doc.tmp_counter).await?;
        if self.autosave_path() == Some(path) {
            *saved = version;
        }
        drop(saved);
        info!(file = %path.display(), "Config saved");
        Ok(())
    }

    fn changed(&self, path: &ConfigPath, action: ConfigAction) {
        self.doc.version.fetch_add(1, Ordering::AcqRel);

        if let Some(bus) = &self.bus {
            let event = ConfigChanged { path: path.to_string(), action };
            if let Err(e) = bus.publish_json(topics::CONFIG_CHANGED, event) {
                warn!(%path, error = %e, "Config change notification failed");
            }
        }

        if let Some(target) = &self.autosave {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(%path, "Autosave skipped outside a Tokio runtime");
                return;
            };
            let doc = Arc::clone(&self.doc);
            let target = Arc::clone(target);
            runtime.spawn(async move {
                if let Err(e) = autosave(&doc, &target).await {
                    warn!(file = %target.display(), error = %e, "Autosave failed");
                }
            });
        }
    }
}

async fn autosave(doc: &Document, target: &Path) -> Result<(), ConfigError> {
    let mut saved = doc.saved.lock().await;
    let version = doc.version.load(Ordering::Acquire);
    if version <= *saved {
        return Ok(());
    }
    let bytes = serde_json::to_vec_pretty(&*doc.value.read())?;
    write_atomic(target, &bytes, &doc.tmp_counter).await?;
    *saved = version;
    debug!(file = %target.display(), version, "Config autosaved");
    Ok(())
}

async fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let bytes = fs::read(path).await.context(format!("Reading {}", path.display()))?;
    serde_json::from_slice(&bytes).context(format!("Parsing {}", path.display()))
}

fn json_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ConfigError> {
    let mut walker = walkdir::WalkDir::new(dir).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.context(format!("Listing {}", dir.display()))?;
        let is_json = entry.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn write_atomic(target: &Path, data: &[u8], counter: &AtomicU64) -> Result<(), ConfigError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.context(format!("Creating {}", parent.display()))?;
    }

    let n = counter.fetch_add(1, Ordering::Relaxed);
    let file_name = target.file_name().and_then(|s| s.to_str()).unwrap_or("config");
    let temp = target.with_file_name(format!(".{file_name}.tmp.{n}"));

    {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp)
            .await
            .context(format!("Creating {}", temp.display()))?;
        file.write_all(data).await.context("Writing config")?;
        file.sync_all().await.context("Syncing config")?;
    }

    if let Err(e) = fs::rename(&temp, target).await {
        let _ = fs::remove_file(&temp).await;
        return Err(ConfigError::Io {
            source: e,
            context: Some(format!("Replacing {}", target.display()).into()),
        });
    }
    Ok(())
}
