#![cfg(feature = "server")]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use lithium_domain::config::AppConfig;
use lithium_kernel::server::AppState;
use lithium_message_bus::MessageBus;
use lithium_runtime::ThreadPool;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let config = AppConfig::default();
    let bus = MessageBus::new();
    let (slice, _) = lithium_devices::init(&config, &bus).await.unwrap();
    let state = AppState::builder()
        .config(config)
        .bus(bus)
        .pool(Arc::new(ThreadPool::new(1).unwrap()))
        .register_slice(slice)
        .build()
        .unwrap();
    let (router, _) = lithium_devices::routes::router().with_state(state).split_for_parts();
    router
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        },
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn add_list_and_remove() {
    let app = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/devices",
        Some(json!({ "type": "FilterWheel", "name": "efw", "connect": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["type"], "filterwheel");
    assert_eq!(body["connected"], true);
    assert_eq!(body["main"], true);

    let (status, _) =
        call(&app, Method::POST, "/api/devices", Some(json!({ "type": "filterwheel", "name": "efw" })))
            .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&app, Method::GET, "/api/devices", None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["devices"]["filterwheel"][0]["name"], "efw");

    let (status, body) = call(&app, Method::GET, "/api/devices/dome", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = call(&app, Method::DELETE, "/api/devices/filterwheel/efw", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, Method::GET, "/api/devices/filterwheel/efw", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn properties_and_tasks() {
    let app = app().await;
    call(&app, Method::POST, "/api/devices", Some(json!({ "type": "focuser", "name": "main" }))).await;

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/devices/focuser/main/properties/backlash",
        Some(json!({ "value": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::POST, "/api/devices/focuser/main/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/devices/focuser/main/properties/backlash",
        Some(json!({ "value": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 20);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/devices/focuser/main/properties/position",
        Some(json!({ "value": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/devices/focuser/main/tasks/move_to",
        Some(json!({ "position": 12000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["position"], 12000);

    let (_, body) = call(&app, Method::GET, "/api/devices/focuser/main/properties/position", None).await;
    assert_eq!(body["value"], 12000);

    let (status, _) = call(&app, Method::POST, "/api/devices/focuser/main/tasks/halt", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::POST, "/api/devices/focuser/main/tasks/spin", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::POST, "/api/devices/focuser/main/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[test]
fn device_errors_map_to_status_codes() {
    use lithium_devices::DeviceError;
    use lithium_kernel::server::ApiError;

    let cases = [
        (DeviceError::NotFound { message: "cam".into(), context: None }, StatusCode::NOT_FOUND),
        (DeviceError::InvalidState { message: "busy".into(), context: None }, StatusCode::CONFLICT),
        (DeviceError::ReadOnly { message: "state".into(), context: None }, StatusCode::FORBIDDEN),
        (DeviceError::from("driver state lost"), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, expected) in cases {
        assert_eq!(ApiError::from(err).status, expected);
    }
}
