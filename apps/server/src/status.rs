use crate::Realtime;
use axum::Json;
use axum::extract::State;
use lithium::domain::constants::SYSTEM_TAG;
use lithium::features::devices::Devices;
use lithium_derive::{api_handler, api_model};
use lithium_kernel::server::{ApiError, AppState};
use std::collections::BTreeMap;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

/// Worker pool counters
#[api_model]
pub struct PoolStatus {
    pub threads: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub panicked: u64,
}

#[api_model]
pub struct StatusResponse {
    pub version: String,
    /// Seconds since the server state was built
    pub uptime: u64,
    pub slices: Vec<String>,
    /// Registered devices per type
    pub devices: BTreeMap<String, usize>,
    pub pool: PoolStatus,
    /// Topics with live channels or callbacks
    pub topics: Vec<String>,
    /// Connected WebSocket clients
    pub clients: usize,
}

#[api_handler(
    get,
    path = "/api/system/status",
    responses((status = OK, description = "Runtime overview", body = StatusResponse)),
    tag = SYSTEM_TAG,
)]
pub(crate) async fn system_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let devices = state
        .try_get_slice::<Devices>()?
        .manager
        .counts()
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), count))
        .collect();
    let stats = state.pool.stats();

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        uptime: state.uptime_secs(),
        slices: state.slice_names().into_iter().map(str::to_owned).collect(),
        devices,
        pool: PoolStatus {
            threads: stats.threads,
            queued: stats.queued,
            active: stats.active,
            completed: stats.completed,
            panicked: stats.panicked,
        },
        topics: state.bus.topics(),
        clients: state.try_get_slice::<Realtime>()?.hub.client_count(),
    }))
}

pub(crate) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(system_status))
}
