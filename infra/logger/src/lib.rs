//! # Logger
//!
//! Installs the global `tracing` subscriber for Lithium binaries: a compact console
//! layer, an optional non-blocking rolling file layer (plain text or JSON), and an
//! `EnvFilter` that honours `RUST_LOG` on top of the configured level.
//!
//! The builder is typed: file-only knobs (`rotation`, `max_files`, `json`) exist only
//! after [`LoggerBuilder::path`] has been called.
//!
//! ## Example
//!
//! ```rust
//! use lithium_logger::{LevelFilter, Logger};
//!
//! let _logger = Logger::builder()
//!     .name("lithium")
//!     .console(true)
//!     .level(LevelFilter::DEBUG)
//!     .env_filter("lithium=debug,tower_http=info")
//!     .init()
//!     .unwrap();
//! ```

mod error;

pub use crate::error::{LoggerError, LoggerErrorExt};
pub use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;

use sealed::Sealed;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const DEFAULT_MAX_FILES: usize = 10;
const LOG_FILE_SUFFIX: &str = "log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug)]
struct Settings {
    console: bool,
    ansi: bool,
    level: LevelFilter,
    env_filter: Option<String>,
    file: Option<FileSettings>,
}

#[derive(Debug)]
struct FileSettings {
    dir: PathBuf,
    rotation: Rotation,
    max_files: usize,
    json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { console: true, ansi: true, level: LevelFilter::INFO, env_filter: None, file: None }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Builder state: no name yet.
#[derive(Debug)]
pub struct Unnamed;
/// Builder state: named.
#[derive(Debug)]
pub struct Named(String);
/// Builder state: console only.
#[derive(Debug)]
pub struct ConsoleOnly;
/// Builder state: file output configured.
#[derive(Debug)]
pub struct WithFile;

impl Sealed for Unnamed {}
impl Sealed for Named {}
impl Sealed for ConsoleOnly {}
impl Sealed for WithFile {}

/// Configures and installs the global subscriber.
#[derive(Debug)]
#[must_use = "the logger is not installed until .init() is called"]
pub struct LoggerBuilder<N: Sealed = Unnamed, F: Sealed = ConsoleOnly> {
    name: N,
    settings: Settings,
    _file: PhantomData<F>,
}

impl LoggerBuilder<Unnamed, ConsoleOnly> {
    /// Names the logger; the name prefixes rolling log files (`<name>.<date>.log`).
    pub fn name(self, name: impl Into<String>) -> LoggerBuilder<Named, ConsoleOnly> {
        LoggerBuilder { name: Named(name.into()), settings: self.settings, _file: PhantomData }
    }
}

impl<F: Sealed> LoggerBuilder<Named, F> {
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.settings.level = level;
        self
    }

    /// Programmatic filter directives (`lithium_devices=trace,hyper=warn`).
    ///
    /// `RUST_LOG` is ignored when this is set; invalid directives fail [`init`](Self::init).
    pub fn env_filter(mut self, directives: impl Into<String>) -> Self {
        self.settings.env_filter = Some(directives.into());
        self
    }

    pub const fn console(mut self, enabled: bool) -> Self {
        self.settings.console = enabled;
        self
    }

    /// Toggles ANSI colours on the console layer.
    pub const fn ansi(mut self, enabled: bool) -> Self {
        self.settings.ansi = enabled;
        self
    }

    /// Installs the subscriber.
    ///
    /// Keep the returned [`Logger`] alive for the whole program; dropping it stops the
    /// background file writer.
    ///
    /// # Errors
    /// * [`LoggerError::InvalidConfiguration`] for an empty name, zero `max_files`, bad
    ///   filter directives or when every output is disabled.
    /// * [`LoggerError::Appender`] if the rolling file cannot be opened.
    /// * [`LoggerError::Subscriber`] if a global subscriber is already installed.
    pub fn init(self) -> Result<Logger, LoggerError> {
        let name = self.name.0;
        validate(&name, &self.settings)?;
        let filter = env_filter(&self.settings)?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if self.settings.console {
            layers.push(fmt::layer().compact().with_ansi(self.settings.ansi).boxed());
        }

        let guard = match self.settings.file {
            Some(file) => {
                let (layer, guard) = file_layer(&name, file)?;
                layers.push(layer);
                Some(guard)
            },
            None => None,
        };

        if layers.is_empty() {
            return Err(LoggerError::InvalidConfiguration {
                message: "no output enabled, turn on the console or set a path".into(),
                context: None,
            });
        }

        tracing_subscriber::registry().with(layers).with(filter).try_init()?;
        tracing::debug!(logger = %name, file = guard.is_some(), "Logging initialized");

        Ok(Logger { guard })
    }
}

impl LoggerBuilder<Named, ConsoleOnly> {
    /// Also write logs to rolling files in `dir` (created if missing).
    pub fn path(self, dir: impl Into<PathBuf>) -> LoggerBuilder<Named, WithFile> {
        let mut settings = self.settings;
        settings.file = Some(FileSettings {
            dir: dir.into(),
            rotation: Rotation::DAILY,
            max_files: DEFAULT_MAX_FILES,
            json: false,
        });
        LoggerBuilder { name: self.name, settings, _file: PhantomData }
    }
}

impl LoggerBuilder<Named, WithFile> {
    pub fn rotation(mut self, rotation: Rotation) -> Self {
        if let Some(file) = self.settings.file.as_mut() {
            file.rotation = rotation;
        }
        self
    }

    /// Number of rotated files to keep.
    pub fn max_files(mut self, max: usize) -> Self {
        if let Some(file) = self.settings.file.as_mut() {
            file.max_files = max;
        }
        self
    }

    /// Writes file output as JSON lines.
    pub fn json(mut self) -> Self {
        if let Some(file) = self.settings.file.as_mut() {
            file.json = true;
        }
        self
    }
}

/// Handle to the installed logging system.
#[derive(Debug)]
#[must_use = "dropping the logger stops the background file writer"]
pub struct Logger {
    guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder { name: Unnamed, settings: Settings::default(), _file: PhantomData }
    }

    /// Whether a file writer is attached.
    #[must_use]
    pub const fn has_file_output(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::info!("Logging system shutting down, flushing buffers");
        }
    }
}

fn validate(name: &str, settings: &Settings) -> Result<(), LoggerError> {
    if name.trim().is_empty() {
        return Err(LoggerError::InvalidConfiguration {
            message: "logger name cannot be empty".into(),
            context: None,
        });
    }
    if settings.file.as_ref().is_some_and(|f| f.max_files == 0) {
        return Err(LoggerError::InvalidConfiguration {
            message: "max_files must be greater than zero".into(),
            context: None,
        });
    }
    Ok(())
}

fn env_filter(settings: &Settings) -> Result<EnvFilter, LoggerError> {
    let builder = EnvFilter::builder().with_default_directive(settings.level.into());
    match &settings.env_filter {
        Some(directives) => builder.parse(directives).map_err(|e| {
            LoggerError::InvalidConfiguration {
                message: format!("invalid filter '{directives}': {e}").into(),
                context: None,
            }
        }),
        None => Ok(builder.from_env_lossy()),
    }
}

fn file_layer(name: &str, file: FileSettings) -> Result<(BoxedLayer, WorkerGuard), LoggerError> {
    std::fs::create_dir_all(&file.dir).map_err(|e| LoggerError::Internal {
        message: e.to_string().into(),
        context: Some(format!("creating log directory {}", file.dir.display()).into()),
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(file.rotation)
        .filename_prefix(name)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(file.max_files)
        .build(&file.dir)
        .context("building rolling file appender")?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().with_writer(writer).with_ansi(false);
    let layer = if file.json { layer.json().boxed() } else { layer.boxed() };
    Ok((layer, guard))
}
