//! Devices feature slice: the [`Device`] trait, simulated drivers and the
//! [`DeviceManager`] registry, plus the `/api/devices` routes (feature `server`).
//!
//! ```rust
//! use lithium_devices::DeviceManager;
//! use lithium_domain::device::DeviceType;
//! use lithium_message_bus::MessageBus;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), lithium_devices::DeviceError> {
//! let manager = DeviceManager::new(MessageBus::new());
//! manager.add_device(DeviceType::Focuser, "main", "sim")?;
//! manager.connect(DeviceType::Focuser, "main").await?;
//!
//! let result = manager
//!     .run_task(DeviceType::Focuser, "main", "move_to", serde_json::json!({ "position": 30000 }))
//!     .await?;
//! assert_eq!(result["position"], 30000);
//! # Ok(())
//! # }
//! ```

mod device;
pub mod drivers;
mod error;
mod manager;
mod property;
#[cfg(feature = "server")]
pub mod routes;

pub use device::{Device, DeviceInfo};
pub use error::{DeviceError, DeviceErrorExt};
pub use manager::DeviceManager;
pub use property::PropertyStore;

use lithium_domain::config::AppConfig;
use lithium_kernel::domain::registry::InitializedSlice;
use lithium_message_bus::MessageBus;
use std::sync::Arc;

/// Devices feature state
#[lithium_derive::lithium_slice]
pub struct Devices {
    pub manager: Arc<DeviceManager>,
}

/// Builds the device registry and registers the boot devices from `config.devices`.
///
/// # Errors
/// Returns the first boot device that fails to register or connect.
pub async fn init(
    config: &AppConfig,
    bus: &MessageBus,
) -> Result<(InitializedSlice, Arc<DeviceManager>), DeviceError> {
    let manager = Arc::new(DeviceManager::new(bus.clone()));
    let registered = manager
        .load_specs(&config.devices.boot)
        .await
        .context("Registering boot devices")?;

    tracing::info!(devices = registered, "Devices slice initialized");

    let slice = Devices::new(DevicesInner { manager: Arc::clone(&manager) });
    Ok((InitializedSlice::new(slice), manager))
}
