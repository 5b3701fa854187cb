use crate::{status, ws};
use axum::Router;
use axum::routing::get;
use lithium::features::{config, devices};
use lithium::kernel::server::AppState;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

#[derive(OpenApi)]
#[openapi(info(title = "Lithium", description = "Astronomy equipment control API"))]
struct ApiDoc;

pub(crate) fn init(state: AppState) -> Router {
    let api = ApiDoc::openapi();

    // Separate the OpenAPI routes and the API documentation object
    let (openapi_routes, api_doc) = OpenApiRouter::with_openapi(api)
        .merge(lithium::server::router::system_router())
        .merge(status::router())
        .merge(devices::routes::router())
        .merge(config::routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
        .split_for_parts();

    // The socket endpoint stays out of the OpenAPI document
    let realtime = Router::new().route("/ws", get(ws::ws_handler)).with_state(state);

    Router::new()
        .merge(openapi_routes)
        .merge(realtime)
        .merge(Scalar::with_url("/api", api_doc))
}
