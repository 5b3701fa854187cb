use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use lithium::domain::config::AppConfig;
use lithium::domain::device::{DeviceSpec, DeviceType};
use lithium_server::Server;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn server() -> Server {
    let mut cfg = AppConfig::default();
    cfg.pool.threads = 2;
    cfg.devices.boot = vec![DeviceSpec {
        kind: DeviceType::Telescope,
        name: "mount".to_owned(),
        driver: "sim".to_owned(),
        connect: true,
    }];
    Server::builder().config(cfg).build().await.unwrap()
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
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

#[tokio::test]
async fn health_and_status() {
    let server = server().await;
    let app = server.router();

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");

    let (status, body) = call(&app, Method::GET, "/api/system/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"], json!({ "telescope": 1 }));
    assert_eq!(body["pool"]["threads"], 2);
    assert_eq!(body["clients"], 0);
    assert_eq!(body["slices"], json!(["ConfigStore", "Devices", "Realtime"]));
    let topics: Vec<&str> = body["topics"].as_array().unwrap().iter().filter_map(Value::as_str).collect();
    assert!(topics.contains(&"device.added"));
    assert!(topics.contains(&"config.changed"));
}

#[tokio::test]
async fn feature_routes_are_mounted() {
    let server = server().await;
    let app = server.router();

    let (status, body) = call(&app, Method::GET, "/api/devices", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/config",
        Some(json!({ "path": "observer/name", "value": "Messier" })),
    )
    .await;
    assert!(status.is_success());

    let (status, body) = call(&app, Method::GET, "/api/config?path=observer", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], json!({ "name": "Messier" }));

    let (status, body) = call(&app, Method::GET, "/api/devices/rotator", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn api_reference_is_served() {
    let server = server().await;
    let app = server.router();

    let response = app
        .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_tls_files_fail_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.server.ssl = Some(lithium::domain::config::SslConfig {
        cert: dir.path().join("cert.pem"),
        key: dir.path().join("key.pem"),
    });

    let err = Server::builder().config(cfg).build().await.unwrap_err();
    assert!(err.to_string().contains("SSL certificate not found"));
}
