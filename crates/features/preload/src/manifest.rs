use crate::error::{PreloadError, PreloadErrorExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One downloadable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    /// Relative to the resource root.
    pub path: String,
    pub url: String,
    /// Lower-case hex SHA-256 of the expected content.
    pub sha256: String,
    /// Expected length in bytes, checked after download when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// List of resources, written as TOML (`[[resources]]` tables) or JSON.
///
/// ```toml
/// [[resources]]
/// path = "catalogs/ngc.csv"
/// url = "https://example.org/ngc.csv"
/// sha256 = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceManifest {
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

impl ResourceManifest {
    /// # Errors
    /// [`PreloadError::Toml`] or [`PreloadError::Manifest`].
    pub fn from_toml_str(raw: &str) -> Result<Self, PreloadError> {
        let manifest: Self = toml::from_str(raw)?;
        manifest.validated()
    }

    /// # Errors
    /// [`PreloadError::Json`] or [`PreloadError::Manifest`].
    pub fn from_json_str(raw: &str) -> Result<Self, PreloadError> {
        let manifest: Self = serde_json::from_str(raw)?;
        manifest.validated()
    }

    /// Reads a manifest file; `.json` files are JSON, anything else TOML.
    ///
    /// # Errors
    /// [`PreloadError::Io`] plus the parse errors above.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PreloadError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .context(format!("Reading manifest {}", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json { Self::from_json_str(&raw) } else { Self::from_toml_str(&raw) };
        parsed.context(format!("Manifest {}", path.display()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Lower-cases checksums and rejects empty fields, malformed digests and
    /// duplicate paths.
    fn validated(mut self) -> Result<Self, PreloadError> {
        let mut seen = HashSet::new();
        for entry in &mut self.resources {
            if entry.path.trim().is_empty() || entry.url.trim().is_empty() {
                return Err(invalid(format!("empty path or url in entry for '{}'", entry.url)));
            }
            entry.sha256 = entry.sha256.trim().to_ascii_lowercase();
            if entry.sha256.len() != 64 || !entry.sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid(format!("'{}': sha256 must be 64 hex digits", entry.path)));
            }
            if !seen.insert(entry.path.clone()) {
                return Err(invalid(format!("'{}' listed twice", entry.path)));
            }
        }
        Ok(self)
    }
}

fn invalid(message: String) -> PreloadError {
    PreloadError::Manifest { message: message.into(), context: None }
}
