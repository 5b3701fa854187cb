//! Request/response frames of the `/ws` endpoint and their dispatch.
//!
//! ```json
//! -> { "id": 7, "command": "device.connect", "params": { "type": "camera", "name": "main" } }
//! <- { "id": 7, "status": "ok", "command": "device.connect", "result": { ... } }
//! ```

use axum::http::StatusCode;
use lithium::domain::device::DeviceType;
use lithium::features::config::ConfigManager;
use lithium::features::config::routes::ConfigValue;
use lithium::features::devices::routes::{AddDeviceRequest, PropertyResponse, TaskResponse};
use lithium::features::devices::DeviceManager;
use lithium_kernel::diff::close_matches;
use lithium_kernel::server::ApiError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Every command [`Dispatcher`] understands.
pub const COMMANDS: &[&str] = &[
    "ping",
    "device.list",
    "device.add",
    "device.remove",
    "device.connect",
    "device.disconnect",
    "device.get",
    "device.set",
    "device.task",
    "config.get",
    "config.set",
    "config.delete",
];

#[derive(Debug, Deserialize)]
pub struct Request {
    /// Echoed back so clients can pair replies with requests.
    #[serde(default)]
    pub id: Option<Value>,
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// HTTP-equivalent status of a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl Response {
    fn ok(id: Option<Value>, command: String, result: Value) -> Self {
        Self { id, status: Status::Ok, command: Some(command), result: Some(result), message: None, code: None }
    }

    /// Error reply to a frame that carried no request.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::error(None, None, &ApiError::bad_request(message.into()))
    }

    fn error(id: Option<Value>, command: Option<String>, err: &ApiError) -> Self {
        Self {
            id,
            status: Status::Error,
            command,
            result: None,
            message: Some(err.message.to_string()),
            code: Some(err.status.as_u16()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListParams {
    #[serde(default, rename = "type")]
    kind: Option<DeviceType>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Target {
    #[serde(rename = "type")]
    kind: DeviceType,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetParams {
    #[serde(rename = "type")]
    kind: DeviceType,
    name: String,
    #[serde(default)]
    property: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetParams {
    #[serde(rename = "type")]
    kind: DeviceType,
    name: String,
    property: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskParams {
    #[serde(rename = "type")]
    kind: DeviceType,
    name: String,
    task: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPathParams {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigSetParams {
    path: String,
    value: Value,
}

fn params<T: DeserializeOwned>(raw: Value) -> Result<T, ApiError> {
    let raw = if raw.is_null() { json!({}) } else { raw };
    serde_json::from_value(raw).map_err(|e| ApiError::bad_request(format!("invalid params: {e}")))
}

fn to_value(value: impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(e.to_string()))
}

/// Executes WebSocket commands against the device registry and the config store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    devices: Arc<DeviceManager>,
    config: Arc<ConfigManager>,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(devices: Arc<DeviceManager>, config: Arc<ConfigManager>) -> Self {
        Self { devices, config }
    }

    /// Handles one text frame. Never fails: malformed input becomes an error reply.
    pub async fn handle_text(&self, text: &str) -> Response {
        match serde_json::from_str::<Request>(text) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                debug!(error = %e, "Malformed WebSocket frame");
                Response::rejected(format!("malformed request: {e}"))
            },
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let Request { id, command, params } = request;
        match self.execute(&command, params).await {
            Ok(result) => Response::ok(id, command, result),
            Err(e) => {
                debug!(command = %command, status = %e.status, message = %e.message, "Command failed");
                Response::error(id, Some(command), &e)
            },
        }
    }

    async fn execute(&self, command: &str, raw: Value) -> Result<Value, ApiError> {
        let devices = &self.devices;
        match command {
            "ping" => Ok(json!({ "pong": true })),

            "device.list" => {
                let p: ListParams = params(raw)?;
                let list = p.kind.map_or_else(|| devices.all_devices(), |kind| devices.devices_of(kind));
                to_value(list)
            },
            "device.add" => {
                let p: AddDeviceRequest = params(raw)?;
                let mut info = devices.add_device(p.kind, &p.name, &p.driver)?;
                if p.connect {
                    info = devices.connect(p.kind, &p.name).await?;
                }
                to_value(info)
            },
            "device.remove" => {
                let p: Target = params(raw)?;
                devices.remove_device(p.kind, &p.name).await?;
                Ok(json!({ "removed": true }))
            },
            "device.connect" => {
                let p: Target = params(raw)?;
                to_value(devices.connect(p.kind, &p.name).await?)
            },
            "device.disconnect" => {
                let p: Target = params(raw)?;
                to_value(devices.disconnect(p.kind, &p.name).await?)
            },
            "device.get" => {
                let p: GetParams = params(raw)?;
                match p.property {
                    Some(property) => {
                        let value = devices.get_property(p.kind, &p.name, &property)?;
                        to_value(PropertyResponse { device: p.name, property, value })
                    },
                    None => to_value(devices.info(p.kind, &p.name)?),
                }
            },
            "device.set" => {
                let p: SetParams = params(raw)?;
                let value = devices.set_property(p.kind, &p.name, &p.property, p.value).await?;
                to_value(PropertyResponse { device: p.name, property: p.property, value })
            },
            "device.task" => {
                let p: TaskParams = params(raw)?;
                let result = devices.run_task(p.kind, &p.name, &p.task, p.params).await?;
                to_value(TaskResponse { device: p.name, task: p.task, result })
            },

            "config.get" => {
                let p: ConfigPathParams = params(raw)?;
                let value = self
                    .config
                    .get(&p.path)?
                    .ok_or_else(|| ApiError::not_found(format!("no value at '{}'", p.path)))?;
                to_value(ConfigValue { path: p.path, value })
            },
            "config.set" => {
                let p: ConfigSetParams = params(raw)?;
                self.config.set(&p.path, p.value.clone())?;
                to_value(ConfigValue { path: p.path, value: p.value })
            },
            "config.delete" => {
                let p: ConfigPathParams = params(raw)?;
                Ok(json!({ "deleted": self.config.delete(&p.path)? }))
            },

            other => Err(ApiError::new(StatusCode::NOT_FOUND, unknown_command(other))),
        }
    }
}

fn unknown_command(command: &str) -> String {
    match close_matches(command, COMMANDS, 1, 0.6).first() {
        Some(suggestion) => format!("unknown command '{command}', did you mean '{suggestion}'?"),
        None => format!("unknown command '{command}'"),
    }
}
