use anyhow::{Context, Result};
use clap::Parser;
use lithium::domain::config::{AppConfig, LoggingConfig};
use lithium::kernel::config::load_config;
use lithium_logger::{LevelFilter, Logger};
use lithium_server::Server;
use std::path::PathBuf;

/// Lithium equipment control server.
#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP and WebSocket server for astronomy equipment control")]
struct Cli {
    /// Configuration file (TOML, JSON or YAML); defaults to `lithium.*` if present
    #[arg(short, long, env = "LITHIUM_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_logging(cfg: &LoggingConfig) -> Result<Logger> {
    let level: LevelFilter =
        cfg.level.parse().with_context(|| format!("Invalid log level '{}'", cfg.level))?;
    let builder = Logger::builder().name(env!("CARGO_PKG_NAME")).console(true).level(level);

    let logger = match &cfg.dir {
        Some(dir) if cfg.json => builder.path(dir).json().init(),
        Some(dir) => builder.path(dir).init(),
        None => builder.init(),
    };
    logger.context("Failed to initialize logging")
}

#[lithium_runtime::main(high_performance)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg: AppConfig =
        load_config(cli.config.as_deref()).context("Critical: Configuration is malformed")?;
    let _log = init_logging(&cfg.logging)?;

    let mut builder = Server::builder().config(cfg);
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }

    builder.build().await?.run().await
}
