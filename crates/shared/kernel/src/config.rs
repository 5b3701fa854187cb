use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Prefix for environment overrides (`LITHIUM__SERVER__PORT=9000`).
pub const ENV_PREFIX: &str = "LITHIUM";
const DEFAULT_CONFIG_FILE: &str = "lithium";

#[lithium_derive::lithium_error]
pub enum ConfigLoadError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Loads `T` from a config file overlaid with `LITHIUM__*` environment variables.
///
/// 1. **File**: the format follows the extension (`toml`, `json`, `yaml`); without
///    an extension every supported one is tried. An explicit `path` must exist; the
///    implicit default (`lithium` in the working directory) is optional, so a bare
///    binary starts on defaults.
/// 2. **Environment**: nested keys are separated by `__`, e.g.
///    `LITHIUM__PRELOAD__ENABLED=true` sets `preload.enabled`.
///
/// # Errors
/// Returns [`ConfigLoadError::Config`] if an explicit file is missing, cannot be parsed,
/// or the merged values do not match `T`.
///
/// # Example
/// ```rust
/// use lithium_kernel::config::load_config;
///
/// #[derive(Default, serde::Deserialize)]
/// struct Settings {
///     port: u16,
/// }
///
/// let cfg: Settings = load_config(Some("config/local")).unwrap_or_default();
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigLoadError>
where
    T: DeserializeOwned,
{
    load_with_env(path, None)
}

/// `env` replaces the process environment when set.
fn load_with_env<T>(
    path: Option<impl AsRef<Path>>,
    env: Option<config::Map<String, String>>,
) -> Result<T, ConfigLoadError>
where
    T: DeserializeOwned,
{
    let (effective_path, required) = path.map_or_else(
        || (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        |p| (p.as_ref().to_path_buf(), true),
    );

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

    if required {
        info!(path = %effective_path.display(), "Loading configuration");
    } else {
        warn!(path = %effective_path.display(), "No config file given, using defaults and environment");
    }

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithium_domain::config::AppConfig;
    use serial_test::serial;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    #[serial]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "lithium.toml",
            r#"
            [server]
            port = 9100

            [[devices.boot]]
            type = "camera"
            name = "main"
            driver = "sim"
            "#,
        );

        let cfg: AppConfig = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.devices.boot.len(), 1);
        assert_eq!(cfg.bus.history_capacity, 100);
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "lithium.json", r#"{ "server": { "port": 9100 } }"#);

        let mut env = config::Map::new();
        env.insert("LITHIUM__SERVER__PORT".to_owned(), "9200".to_owned());
        env.insert("LITHIUM__PRELOAD__ENABLED".to_owned(), "true".to_owned());

        let cfg: AppConfig = load_with_env(Some(&path), Some(env)).unwrap();
        assert_eq!(cfg.server.port, 9200);
        assert!(cfg.preload.enabled);
    }

    #[test]
    #[serial]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config::<AppConfig>(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to build config"));
    }
}
