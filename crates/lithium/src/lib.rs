//! Facade crate for Lithium features and shared modules.
//! Re-exports domain/kernel primitives and aggregates feature initialization.
//! Keep this crate thin: it should compose other crates, not implement business logic.
//!
//! ## Usage
//! - Add `lithium` with the `server` feature for the HTTP routes of each slice.
//! - Call [`init`] once at startup; register the returned slices on the app state.

use lithium_domain::config::AppConfig;
use lithium_message_bus::MessageBus;
use std::borrow::Cow;
use std::sync::Arc;

pub use lithium_domain as domain;
pub use lithium_kernel as kernel;
pub use lithium_message_bus as message_bus;
pub use lithium_runtime as runtime;

#[cfg(feature = "server")]
pub mod server {
    pub mod router {
        pub use lithium_kernel::server::system_router;
    }
}

/// Feature registry for runtime introspection.
pub mod features {
    pub use lithium_config as config;
    pub use lithium_devices as devices;
    pub use lithium_preload as preload;

    /// Build-time enabled features (by Cargo feature).
    pub const ENABLED: &[&str] = &[
        #[cfg(feature = "server")]
        "server",
        "devices",
        "config",
        "preload",
    ];

    #[must_use]
    pub fn is_enabled(name: &str) -> bool {
        ENABLED.contains(&name)
    }
}

#[lithium_derive::lithium_error]
pub enum LithiumError {
    #[error("Devices slice failed{}: {source}", format_context(.context))]
    Devices { source: lithium_devices::DeviceError, context: Option<Cow<'static, str>> },

    #[error("Config slice failed{}: {source}", format_context(.context))]
    Config { source: lithium_config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Everything [`init`] produced.
#[derive(Debug)]
pub struct Platform {
    /// Feature slices, ready for `AppState::builder().register_slices(..)`.
    pub slices: Vec<domain::registry::InitializedSlice>,
    pub devices: Arc<features::devices::DeviceManager>,
    pub config: Arc<features::config::ConfigManager>,
}

/// Initialize all feature slices.
///
/// # Errors
/// Returns an error if any feature initialization fails.
pub async fn init(config: &AppConfig, bus: &MessageBus) -> Result<Platform, LithiumError> {
    let mut slices = Vec::new();

    // Config store
    let (slice, store) = features::config::init(config, bus).await?;
    slices.push(slice);

    // Devices
    let (slice, devices) = features::devices::init(config, bus).await?;
    slices.push(slice);

    tracing::info!(slices = slices.len(), "Feature slices initialized");
    Ok(Platform { slices, devices, config: store })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithium_domain::device::{DeviceSpec, DeviceType};

    #[tokio::test]
    async fn init_registers_every_slice() {
        let mut config = AppConfig::default();
        config.devices.boot = vec![DeviceSpec {
            kind: DeviceType::Camera,
            name: "main".to_owned(),
            driver: "sim".to_owned(),
            connect: true,
        }];

        let platform = init(&config, &MessageBus::new()).await.unwrap();
        let names: Vec<_> = platform.slices.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["ConfigStore", "Devices"]);
        assert_eq!(platform.devices.count(), 1);
        assert!(platform.config.snapshot().as_object().unwrap().is_empty());
    }

    #[test]
    fn feature_flags() {
        assert!(features::is_enabled("devices"));
        assert!(!features::is_enabled("scripting"));
    }
}
