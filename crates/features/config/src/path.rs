use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Key path into the configuration document.
///
/// Segments are separated by `/` (a leading `/` is allowed) or, when the path has no
/// slash, by `.`: `server/port`, `/server/port` and `server.port` are the same path.
/// The empty path is the document root. Numeric segments index arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    #[must_use]
    pub const fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// # Errors
    /// [`ConfigError::InvalidPath`] for empty segments (`a//b`, `a.`, `/`-only tails).
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
        if body.is_empty() {
            return Ok(Self::root());
        }

        let separator = if body.contains('/') { '/' } else { '.' };
        let segments: Vec<String> = body.split(separator).map(str::to_owned).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidPath {
                message: format!("'{raw}' has an empty segment").into(),
                context: None,
            });
        }
        Ok(Self { segments })
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Splits off the last segment; `None` for the root.
    #[must_use]
    pub fn split_last(&self) -> Option<(&str, &[String])> {
        self.segments.split_last().map(|(last, parents)| (last.as_str(), parents))
    }

    #[must_use]
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for ConfigPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ConfigPath {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}
