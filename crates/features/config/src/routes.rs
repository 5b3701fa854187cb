//! `/api/config` endpoints.

use crate::error::ConfigError;
use crate::json::JsonChange;
use crate::{ConfigStore, ConfigStoreInner};
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use lithium_derive::{api_handler, api_model};
use lithium_domain::constants::CONFIG_TAG;
use lithium_kernel::server::{ApiError, AppState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        let status = match &err {
            ConfigError::InvalidPath { .. }
            | ConfigError::TypeConflict { .. }
            | ConfigError::IndexOutOfRange { .. }
            | ConfigError::Json { .. }
            | ConfigError::Sandbox { .. } => StatusCode::BAD_REQUEST,
            ConfigError::NotFound { .. } => StatusCode::NOT_FOUND,
            ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            },
            ConfigError::Io { .. } | ConfigError::Walk { .. } | ConfigError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };
        Self::new(status, err.to_string())
    }
}

#[api_model]
pub struct PathQuery {
    /// `/`- or `.`-separated key path; empty or missing means the whole document.
    #[serde(default)]
    pub path: String,
}

#[api_model]
pub struct ConfigValue {
    pub path: String,
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub value: Value,
}

#[api_model]
pub struct SetConfigRequest {
    pub path: String,
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub value: Value,
}

#[api_model]
pub struct FileRequest {
    /// Relative to the store directory; defaults to the configured store file.
    #[serde(default)]
    pub path: Option<String>,
    /// `load` only: merge into the root instead of under the file stem.
    #[serde(default)]
    pub at_root: bool,
}

#[api_model]
pub struct FileResponse {
    pub file: String,
    /// Where a loaded document landed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Any JSON document.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct Document(#[schema(value_type = Object)] pub Value);

fn store(state: &AppState) -> Result<&ConfigStoreInner, ApiError> {
    let slice = state.try_get_slice::<ConfigStore>()?;
    Ok(&**slice)
}

/// An empty body means the defaults.
fn file_request(body: &[u8]) -> Result<FileRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FileRequest { path: None, at_root: false });
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(e.to_string()))
}

#[api_handler(
    get,
    path = "/api/config",
    params(("path" = Option<String>, Query, description = "Key path, e.g. `server/port`")),
    responses(
        (status = OK, description = "Value at the path", body = ConfigValue),
        (status = NOT_FOUND, description = "No value at the path", body = lithium_kernel::server::ErrorBody),
    ),
    tag = CONFIG_TAG,
)]
pub(crate) async fn get_config(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ConfigValue>, ApiError> {
    let value = store(&state)?
        .manager
        .get(&query.path)?
        .ok_or_else(|| ApiError::not_found(format!("no config value at '{}'", query.path)))?;
    Ok(Json(ConfigValue { path: query.path, value }))
}

#[api_handler(
    put,
    path = "/api/config",
    request_body = SetConfigRequest,
    responses(
        (status = OK, description = "Value stored", body = ConfigValue),
        (status = BAD_REQUEST, description = "Malformed path or type conflict", body = lithium_kernel::server::ErrorBody),
    ),
    tag = CONFIG_TAG,
)]
pub(crate) async fn set_config(
    State(state): State<AppState>,
    payload: Result<Json<SetConfigRequest>, JsonRejection>,
) -> Result<Json<ConfigValue>, ApiError> {
    let Json(SetConfigRequest { path, value }) = payload?;
    store(&state)?.manager.set(&path, value.clone())?;
    Ok(Json(ConfigValue { path, value }))
}

#[api_handler(
    delete,
    path = "/api/config",
    params(("path" = Option<String>, Query, description = "Key path; empty clears the document")),
    responses(
        (status = NO_CONTENT, description = "Value removed"),
        (status = NOT_FOUND, description = "No value at the path", body = lithium_kernel::server::ErrorBody),
    ),
    tag = CONFIG_TAG,
)]
pub(crate) async fn delete_config(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<StatusCode, ApiError> {
    if store(&state)?.manager.delete(&query.path)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no config value at '{}'", query.path)))
    }
}

#[api_handler(
    post,
    path = "/api/config/merge",
    request_body(content = Document, description = "Object deep-merged into the root"),
    responses((status = OK, description = "Document after the merge", body = ConfigValue)),
    tag = CONFIG_TAG,
)]
pub(crate) async fn merge_config(
    State(state): State<AppState>,
    payload: Result<Json<Document>, JsonRejection>,
) -> Result<Json<ConfigValue>, ApiError> {
    let Json(Document(patch)) = payload?;
    if !patch.is_object() {
        return Err(ApiError::bad_request("merge expects a JSON object"));
    }
    let manager = &store(&state)?.manager;
    manager.merge(patch);
    Ok(Json(ConfigValue { path: String::new(), value: manager.snapshot() }))
}

#[api_handler(
    post,
    path = "/api/config/diff",
    request_body(content = Document, description = "Document to compare against"),
    responses((status = OK, description = "Changes from the current document", body = Vec<JsonChange>)),
    tag = CONFIG_TAG,
)]
pub(crate) async fn diff_config(
    State(state): State<AppState>,
    payload: Result<Json<Document>, JsonRejection>,
) -> Result<Json<Vec<JsonChange>>, ApiError> {
    let Json(Document(other)) = payload?;
    Ok(Json(store(&state)?.manager.diff(&other)))
}

#[api_handler(
    post,
    path = "/api/config/save",
    request_body = FileRequest,
    responses(
        (status = OK, description = "Document written", body = FileResponse),
        (status = NOT_FOUND, description = "No target file", body = lithium_kernel::server::ErrorBody),
    ),
    tag = CONFIG_TAG,
)]
pub(crate) async fn save_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FileResponse>, ApiError> {
    let request = file_request(&body)?;
    let store = store(&state)?;
    let file = store.resolve(request.path.as_deref())?;
    store.manager.save(&file).await?;
    Ok(Json(FileResponse { file: file.display().to_string(), key: None }))
}

#[api_handler(
    post,
    path = "/api/config/load",
    request_body = FileRequest,
    responses(
        (status = OK, description = "Document loaded", body = FileResponse),
        (status = NOT_FOUND, description = "File missing", body = lithium_kernel::server::ErrorBody),
    ),
    tag = CONFIG_TAG,
)]
pub(crate) async fn load_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FileResponse>, ApiError> {
    let request = file_request(&body)?;
    let store = store(&state)?;
    let file = store.resolve(request.path.as_deref())?;
    let key = if request.at_root {
        store.manager.load_file_at_root(&file).await?;
        None
    } else {
        Some(store.manager.load_file(&file).await?)
    };
    Ok(Json(FileResponse { file: file.display().to_string(), key }))
}

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_config, set_config, delete_config))
        .routes(routes!(merge_config))
        .routes(routes!(diff_config))
        .routes(routes!(save_config))
        .routes(routes!(load_config))
}
