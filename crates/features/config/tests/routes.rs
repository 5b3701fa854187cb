#![cfg(feature = "server")]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use lithium_domain::config::AppConfig;
use lithium_kernel::server::AppState;
use lithium_message_bus::MessageBus;
use lithium_runtime::ThreadPool;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

async fn app(root: &Path) -> Router {
    let mut config = AppConfig::default();
    config.store.dir = Some(root.to_path_buf());
    config.store.file = Some(root.join("store.json"));

    let bus = MessageBus::new();
    let (slice, _) = lithium_config::init(&config, &bus).await.unwrap();
    let state = AppState::builder()
        .config(config)
        .bus(bus)
        .pool(Arc::new(ThreadPool::new(1).unwrap()))
        .register_slice(slice)
        .build()
        .unwrap();
    let (router, _) = lithium_config::routes::router().with_state(state).split_for_parts();
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
async fn set_get_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path()).await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/config",
        Some(json!({ "path": "camera/gain", "value": 120 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 120);

    let (status, body) = call(&app, Method::GET, "/api/config?path=camera.gain", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "path": "camera.gain", "value": 120 }));

    let (_, body) = call(&app, Method::GET, "/api/config", None).await;
    assert_eq!(body["value"], json!({ "camera": { "gain": 120 } }));

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/config",
        Some(json!({ "path": "camera/gain/x", "value": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = call(&app, Method::GET, "/api/config?path=a//b", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::DELETE, "/api/config?path=camera/gain", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, Method::DELETE, "/api/config?path=camera/gain", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn merge_and_diff() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path()).await;

    let (status, body) =
        call(&app, Method::POST, "/api/config/merge", Some(json!({ "mount": { "slew_rate": 4 } }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["mount"]["slew_rate"], 4);

    let (status, _) = call(&app, Method::POST, "/api/config/merge", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        call(&app, Method::POST, "/api/config/diff", Some(json!({ "mount": { "slew_rate": 8 } }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "op": "modified", "path": "mount/slew_rate", "from": 4, "to": 8 }]));
}

#[tokio::test]
async fn save_and_load_stay_inside_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path()).await;
    call(&app, Method::PUT, "/api/config", Some(json!({ "path": "target", "value": "M42" }))).await;

    let (status, body) = call(&app, Method::POST, "/api/config/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["file"].as_str().unwrap().ends_with("store.json"));
    assert!(dir.path().join("store.json").is_file());

    let (status, _) =
        call(&app, Method::POST, "/api/config/save", Some(json!({ "path": "backup/copy.json" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(dir.path().join("backup/copy.json").is_file());

    let (status, _) =
        call(&app, Method::POST, "/api/config/save", Some(json!({ "path": "../escape.json" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        call(&app, Method::POST, "/api/config/load", Some(json!({ "path": "backup/copy.json" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "copy");
    let (_, body) = call(&app, Method::GET, "/api/config?path=copy/target", None).await;
    assert_eq!(body["value"], "M42");

    let (status, _) =
        call(&app, Method::POST, "/api/config/load", Some(json!({ "path": "nope.json" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
