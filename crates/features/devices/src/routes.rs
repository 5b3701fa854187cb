//! `/api/devices` endpoints.

use crate::device::DeviceInfo;
use crate::error::DeviceError;
use crate::manager::DeviceManager;
use crate::Devices;
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use lithium_derive::{api_handler, api_model};
use lithium_domain::constants::DEVICES_TAG;
use lithium_domain::device::DeviceType;
use lithium_kernel::server::{ApiError, AppState};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

impl From<DeviceError> for ApiError {
    fn from(err: DeviceError) -> Self {
        let status = match &err {
            DeviceError::NotFound { .. }
            | DeviceError::UnknownProperty { .. }
            | DeviceError::UnknownTask { .. } => StatusCode::NOT_FOUND,
            DeviceError::AlreadyExists { .. }
            | DeviceError::NotConnected { .. }
            | DeviceError::InvalidState { .. } => StatusCode::CONFLICT,
            DeviceError::UnknownDriver { .. }
            | DeviceError::InvalidName { .. }
            | DeviceError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
            DeviceError::ReadOnly { .. } => StatusCode::FORBIDDEN,
            DeviceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[api_model]
pub struct AddDeviceRequest {
    #[serde(rename = "type")]
    #[cfg_attr(feature = "server", schema(value_type = String))]
    pub kind: DeviceType,
    pub name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Connect right after registration.
    #[serde(default)]
    pub connect: bool,
}

fn default_driver() -> String {
    "sim".to_owned()
}

/// Devices grouped by type.
#[api_model]
pub struct DeviceListResponse {
    pub count: usize,
    pub devices: BTreeMap<String, Vec<DeviceInfo>>,
}

#[api_model]
pub struct PropertyValue {
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub value: Value,
}

#[api_model]
pub struct PropertyResponse {
    pub device: String,
    pub property: String,
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub value: Value,
}

#[api_model]
pub struct TaskResponse {
    pub device: String,
    pub task: String,
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub result: Value,
}

fn manager(state: &AppState) -> Result<&DeviceManager, ApiError> {
    Ok(&state.try_get_slice::<Devices>()?.manager)
}

fn parse_kind(raw: &str) -> Result<DeviceType, ApiError> {
    DeviceType::from_str(raw)
        .map_err(|_| ApiError::bad_request(format!("unknown device type '{raw}'")))
}

#[api_handler(
    get,
    path = "/api/devices",
    responses((status = OK, description = "All devices grouped by type", body = DeviceListResponse)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<DeviceListResponse>, ApiError> {
    let all = manager(&state)?.all_devices();
    let count = all.len();
    let mut devices: BTreeMap<String, Vec<DeviceInfo>> = BTreeMap::new();
    for info in all {
        devices.entry(info.kind.to_string()).or_default().push(info);
    }
    Ok(Json(DeviceListResponse { count, devices }))
}

#[api_handler(
    post,
    path = "/api/devices",
    request_body = AddDeviceRequest,
    responses(
        (status = CREATED, description = "Device registered", body = DeviceInfo),
        (status = CONFLICT, description = "Device already exists", body = lithium_kernel::server::ErrorBody),
    ),
    tag = DEVICES_TAG,
)]
pub(crate) async fn add_device(
    State(state): State<AppState>,
    payload: Result<Json<AddDeviceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DeviceInfo>), ApiError> {
    let Json(request) = payload?;
    let devices = manager(&state)?;
    let mut info = devices.add_device(request.kind, &request.name, &request.driver)?;
    if request.connect {
        info = devices.connect(request.kind, &request.name).await?;
    }
    Ok((StatusCode::CREATED, Json(info)))
}

#[api_handler(
    get,
    path = "/api/devices/{kind}",
    params(("kind" = String, Path, description = "Device type")),
    responses((status = OK, description = "Devices of one type", body = Vec<DeviceInfo>)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn list_by_kind(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<DeviceInfo>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(manager(&state)?.devices_of(kind)))
}

#[api_handler(
    get,
    path = "/api/devices/{kind}/{name}",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
    ),
    responses((status = OK, description = "Device details", body = DeviceInfo)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn get_device(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<DeviceInfo>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(manager(&state)?.info(kind, &name)?))
}

#[api_handler(
    delete,
    path = "/api/devices/{kind}/{name}",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
    ),
    responses((status = NO_CONTENT, description = "Device removed")),
    tag = DEVICES_TAG,
)]
pub(crate) async fn remove_device(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;
    manager(&state)?.remove_device(kind, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[api_handler(
    post,
    path = "/api/devices/{kind}/{name}/connect",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
    ),
    responses((status = OK, description = "Device connected", body = DeviceInfo)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn connect_device(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<DeviceInfo>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(manager(&state)?.connect(kind, &name).await?))
}

#[api_handler(
    post,
    path = "/api/devices/{kind}/{name}/disconnect",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
    ),
    responses((status = OK, description = "Device disconnected", body = DeviceInfo)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn disconnect_device(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<DeviceInfo>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(manager(&state)?.disconnect(kind, &name).await?))
}

#[api_handler(
    get,
    path = "/api/devices/{kind}/{name}/properties/{property}",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
        ("property" = String, Path, description = "Property name"),
    ),
    responses((status = OK, description = "Property value", body = PropertyResponse)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn get_property(
    State(state): State<AppState>,
    Path((kind, name, property)): Path<(String, String, String)>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let value = manager(&state)?.get_property(kind, &name, &property)?;
    Ok(Json(PropertyResponse { device: name, property, value }))
}

#[api_handler(
    put,
    path = "/api/devices/{kind}/{name}/properties/{property}",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
        ("property" = String, Path, description = "Property name"),
    ),
    request_body = PropertyValue,
    responses(
        (status = OK, description = "Property updated", body = PropertyResponse),
        (status = FORBIDDEN, description = "Property is read-only", body = lithium_kernel::server::ErrorBody),
    ),
    tag = DEVICES_TAG,
)]
pub(crate) async fn set_property(
    State(state): State<AppState>,
    Path((kind, name, property)): Path<(String, String, String)>,
    payload: Result<Json<PropertyValue>, JsonRejection>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let Json(body) = payload?;
    let kind = parse_kind(&kind)?;
    let value = manager(&state)?.set_property(kind, &name, &property, body.value).await?;
    Ok(Json(PropertyResponse { device: name, property, value }))
}

/// The body holds the task parameters; an empty body means no parameters.
#[api_handler(
    post,
    path = "/api/devices/{kind}/{name}/tasks/{task}",
    params(
        ("kind" = String, Path, description = "Device type"),
        ("name" = String, Path, description = "Device name"),
        ("task" = String, Path, description = "Task name"),
    ),
    responses((status = OK, description = "Task result", body = TaskResponse)),
    tag = DEVICES_TAG,
)]
pub(crate) async fn run_task(
    State(state): State<AppState>,
    Path((kind, name, task)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Json<TaskResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid task parameters: {e}")))?
    };
    let result = manager(&state)?.run_task(kind, &name, &task, params).await?;
    Ok(Json(TaskResponse { device: name, task, result }))
}

/// Device routes, mounted by the server when the slice is registered.
pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_devices, add_device))
        .routes(routes!(list_by_kind))
        .routes(routes!(get_device, remove_device))
        .routes(routes!(connect_device))
        .routes(routes!(disconnect_device))
        .routes(routes!(get_property, set_property))
        .routes(routes!(run_task))
}
