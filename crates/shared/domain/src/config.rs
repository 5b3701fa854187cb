use crate::constants::DEFAULT_PORT;
use crate::device::DeviceSpec;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

/// Every section of the server configuration file.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfigInner {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub pool: PoolConfig,
    pub bus: BusConfig,
    pub devices: DevicesConfig,
    pub store: StoreConfig,
    pub preload: PreloadConfig,
}

/// Arc-wrapped config, cheap to clone into subsystems; mutation copies on write.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(flatten, default)]
    inner: Arc<AppConfigInner>,
}

impl Deref for AppConfig {
    type Target = AppConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AppConfig {
    fn deref_mut(&mut self) -> &mut AppConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub ssl: Option<SslConfig>,
}

/// TLS certificate/key paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Directory for rolling log files; console only when unset.
    pub dir: Option<PathBuf>,
    pub json: bool,
}

/// Blocking worker pool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Zero means one thread per available core.
    pub threads: usize,
    /// Zero means unbounded.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub channel_capacity: usize,
    pub history_capacity: usize,
}

/// Devices registered at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub boot: Vec<DeviceSpec>,
}

/// JSON configuration store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of `.json` documents loaded at startup.
    pub dir: Option<PathBuf>,
    /// Persist target for `save` and autosave.
    pub file: Option<PathBuf>,
    pub autosave: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Run the preloader at startup.
    pub enabled: bool,
    pub manifest: PathBuf,
    /// Every resource path is resolved inside this directory.
    pub root: PathBuf,
    pub concurrency: usize,
    pub retries: u32,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

// --- Default ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: DEFAULT_PORT, ssl: None }
    }
}

impl Default for SslConfig {
    fn default() -> Self {
        Self { cert: PathBuf::from("cert.pem"), key: PathBuf::from("key.pem") }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), dir: None, json: false }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { channel_capacity: 128, history_capacity: 100 }
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            manifest: PathBuf::from("resources.toml"),
            root: PathBuf::from("resources"),
            concurrency: 4,
            retries: 3,
            timeout_seconds: 60,
            user_agent: "lithium-preload".to_owned(),
        }
    }
}
