//! Payloads published on the message bus and forwarded to WebSocket clients.

use crate::device::DeviceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device lifecycle: `device.added`, `device.removed`, `device.connected`,
/// `device.disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub name: String,
    pub driver: String,
}

/// A device property changed value (`device.<type>.<name>.property`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChanged {
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub device: String,
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigAction {
    Set,
    Delete,
    Merge,
    Load,
    Clear,
    Tidy,
}

/// The configuration document changed under `path` (empty for the root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChanged {
    pub path: String,
    pub action: ConfigAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadStage {
    Verified,
    Downloading,
    Retrying,
    Completed,
    Failed,
}

/// Progress of a single resource in a preload run (`preload.progress`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadProgress {
    pub path: String,
    pub stage: PreloadStage,
    /// 1-based index of the resource in the run.
    pub index: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_event_uses_type_key() {
        let event = DeviceEvent {
            id: "abc".to_owned(),
            kind: DeviceType::FilterWheel,
            name: "wheel".to_owned(),
            driver: "sim".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "id": "abc", "type": "filterwheel", "name": "wheel", "driver": "sim" })
        );
    }

    #[test]
    fn preload_progress_omits_empty_message() {
        let progress = PreloadProgress {
            path: "catalogs/ngc.json".to_owned(),
            stage: PreloadStage::Completed,
            index: 1,
            total: 2,
            message: None,
        };
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["stage"], "completed");
        assert!(value.get("message").is_none());
    }
}
