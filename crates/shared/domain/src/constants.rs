//! Names shared between crates: bus topics, defaults and identifiers.

pub const APP_NAME: &str = "lithium";
pub const DEFAULT_PORT: u16 = 8000;

/// Bus topics.
pub mod topics {
    pub const DEVICE_ADDED: &str = "device.added";
    pub const DEVICE_REMOVED: &str = "device.removed";
    pub const DEVICE_CONNECTED: &str = "device.connected";
    pub const DEVICE_DISCONNECTED: &str = "device.disconnected";
    pub const CONFIG_CHANGED: &str = "config.changed";
    pub const PRELOAD_PROGRESS: &str = "preload.progress";

    /// Namespaces forwarded to WebSocket clients.
    pub const FORWARDED_NAMESPACES: [&str; 3] = ["device", "config", "preload"];

    /// `device.<type>.<name>.property`
    #[must_use]
    pub fn device_property(kind: &str, name: &str) -> String {
        format!("device.{kind}.{name}.property")
    }
}

/// `OpenAPI` tags.
pub const SYSTEM_TAG: &str = "System";
pub const DEVICES_TAG: &str = "Devices";
pub const CONFIG_TAG: &str = "Config";
