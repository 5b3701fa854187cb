//! # Lithium Server
//!
//! HTTP and WebSocket front end for the Lithium equipment control platform, built on
//! `Axum`, the topic-keyed message bus and a shared worker pool.
//!
//! ## Example
//! ```no_run
//! use lithium_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Server::builder()
//!         .port(8000)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod hub;
pub mod protocol;
mod router;
mod status;
mod ws;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use hub::Hub;
use lithium::domain::config::AppConfig;
use lithium::kernel::server::AppState;
use lithium_message_bus::{BusSettings, MessageBus};
use lithium_runtime::ThreadPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Real-time state: the WebSocket hub
#[lithium_derive::lithium_slice]
pub struct Realtime {
    pub hub: Hub,
}

/// A fluent builder for configuring and initializing the [`Server`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    cfg: AppConfig,
}

impl ServerBuilder {
    pub fn config(mut self, cfg: AppConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.server.port = port;
        self
    }

    fn validate_ssl_config(&self) -> Result<()> {
        if let Some(ssl) = &self.cfg.server.ssl {
            if !ssl.cert.exists() {
                anyhow::bail!("SSL certificate not found at: {}", ssl.cert.display());
            }
            if !ssl.key.exists() {
                anyhow::bail!("SSL key not found at: {}", ssl.key.display());
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let metadata = ssl.key.metadata()?;
                if metadata.permissions().mode() & 0o077 != 0 {
                    warn!(
                        "SECURITY: SSL Private Key {} has insecure permissions (should be 600)",
                        ssl.key.display()
                    );
                }
            }
        }
        Ok(())
    }

    fn init_pool(&self) -> Result<Arc<ThreadPool>> {
        let mut builder = ThreadPool::builder()
            .queue_capacity(self.cfg.pool.queue_capacity)
            .thread_name("lithium-worker");
        // 0 keeps the detected core count
        if self.cfg.pool.threads > 0 {
            builder = builder.threads(self.cfg.pool.threads);
        }
        let pool = builder.build().context("Failed to start the worker pool")?;
        Ok(Arc::new(pool))
    }

    /// Consumes the builder and initializes the server.
    ///
    /// # Process
    /// 1. Validates the TLS files, if configured
    /// 2. Starts the worker pool and the message bus
    /// 3. Initializes the feature slices (config store, devices)
    /// 4. Attaches the WebSocket hub to the bus
    /// 5. Constructs the application state
    ///
    /// # Errors
    /// Returns an error if:
    /// * SSL certificate/key files are missing
    /// * The worker pool cannot spawn its threads
    /// * A boot device or the config store fails to initialize
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn build(self) -> Result<Server> {
        self.validate_ssl_config()?;

        let address = SocketAddr::new(self.cfg.server.address, self.cfg.server.port);
        info!(address = %address, "Initializing server");

        let pool = self.init_pool()?;
        let bus = MessageBus::with_settings(BusSettings {
            channel_capacity: self.cfg.bus.channel_capacity,
            history_capacity: self.cfg.bus.history_capacity,
        });

        let platform = lithium::init(&self.cfg, &bus).await.context("Platform bootstrap failed")?;

        let hub = Hub::new();
        hub.attach(&bus, &platform.devices).context("Failed to attach the WebSocket hub")?;
        let realtime = Realtime::new(RealtimeInner { hub: hub.clone() });

        let state = AppState::builder()
            .config(self.cfg)
            .bus(bus)
            .pool(pool)
            .register_slices(platform.slices)
            .register_slice(lithium::domain::registry::InitializedSlice::new(realtime))
            .build()
            .context("Failed to finalize API state registry")?;

        info!(slices = ?state.slice_names(), "Server state ready");
        Ok(Server { state, hub })
    }
}

/// A fully initialized server instance ready to run.
#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    state: AppState,
    hub: Hub,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The complete application router, also usable without binding a socket.
    pub fn router(&self) -> Router {
        router::init(self.state.clone())
    }

    /// Starts the server and runs until the shutdown signal is received.
    ///
    /// Resource preloading, when enabled, runs in the background.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the configured address
    /// or if SSL/TLS setup fails.
    pub async fn run(self) -> Result<()> {
        let cfg = self.state.config.clone();
        let address = SocketAddr::new(cfg.server.address, cfg.server.port);

        info!(address = %address, ssl = cfg.server.ssl.is_some(), "Starting server");

        if cfg.preload.enabled {
            let (pool, bus) = (Arc::clone(&self.state.pool), self.state.bus.clone());
            let preload = cfg.preload.clone();
            tokio::spawn(async move {
                match lithium::features::preload::run(&preload, pool, &bus).await {
                    Ok(Some(report)) if !report.is_complete() => {
                        warn!(failed = report.failed.len(), "Some resources could not be preloaded");
                    },
                    Ok(_) => {},
                    Err(e) => error!(error = %e, "Resource preload failed"),
                }
            });
        }

        let app = self.router();

        let handle = Handle::<SocketAddr>::new();
        let shutdown_handle = handle.clone();

        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!("Error while waiting for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received, starting graceful shutdown...");
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(30)));
        });

        if let Some(ssl_config) = &cfg.server.ssl {
            info!("Starting HTTPS server on https://{address}");

            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &ssl_config.cert,
                &ssl_config.key,
            )
            .await
            .context("Failed to load SSL/TLS certificates")?;

            axum_server::bind_rustls(address, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        } else {
            info!("Starting HTTP server on http://{address}");

            axum_server::bind(address)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }

        self.hub.detach();
        let disconnected = self.state.bus.shutdown();
        self.state.pool.shutdown();
        info!(disconnected, "Server shutdown complete");
        Ok(())
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub const fn hub(&self) -> &Hub {
        &self.hub
    }
}

/// Listens for shutdown signals (Ctrl+C, SIGTERM).
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }

    Ok(())
}
