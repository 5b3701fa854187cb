use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use lithium_domain::config::PreloadConfig;
use lithium_message_bus::MessageBus;
use lithium_preload::{
    PreloadError, Preloader, ResourceEntry, ResourceManifest, ResourceStatus, sha256_bytes,
};
use lithium_runtime::ThreadPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const NGC: &str = "name,ra,dec\nNGC224,0.712,41.27\n";
const FLAKY: &str = "flaky but eventually fine";

async fn file(Path(name): Path<String>) -> (StatusCode, &'static str) {
    match name.as_str() {
        "ngc.csv" => (StatusCode::OK, NGC),
        _ => (StatusCode::NOT_FOUND, "missing"),
    }
}

async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
        (StatusCode::SERVICE_UNAVAILABLE, "busy")
    } else {
        (StatusCode::OK, FLAKY)
    }
}

async fn serve(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new()
        .route("/files/{name}", get(file))
        .route("/flaky", get(flaky))
        .with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn entry(path: &str, url: String, content: &str) -> ResourceEntry {
    ResourceEntry { path: path.to_owned(), url, sha256: sha256_bytes(content.as_bytes()), size: None }
}

fn preloader(root: &std::path::Path, bus: &MessageBus) -> Preloader {
    Preloader::builder(root, Arc::new(ThreadPool::new(2).unwrap()))
        .bus(bus.clone())
        .concurrency(2)
        .retries(3)
        .backoff(Duration::from_millis(1))
        .build()
        .unwrap()
}

#[tokio::test]
async fn downloads_missing_and_keeps_verified() {
    let base = serve(Arc::default()).await;
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("notes.txt"), "keep me").unwrap();

    let manifest = ResourceManifest {
        resources: vec![
            entry("notes.txt", format!("{base}/files/notes.txt"), "keep me"),
            entry("catalogs/ngc.csv", format!("{base}/files/ngc.csv"), NGC),
        ],
    };
    let bus = MessageBus::new();
    let preloader = preloader(root.path(), &bus);

    let before = preloader.verify(&manifest).await.unwrap();
    assert_eq!(before[0].1, ResourceStatus::Ok);
    assert_eq!(before[1].1, ResourceStatus::Missing);

    let report = preloader.preload(&manifest).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.total, 2);
    assert_eq!(report.verified, vec!["notes.txt"]);
    assert_eq!(report.downloaded, vec!["catalogs/ngc.csv"]);
    assert_eq!(std::fs::read_to_string(root.path().join("catalogs/ngc.csv")).unwrap(), NGC);
    assert!(preloader.verify(&manifest).await.unwrap().iter().all(|(_, s)| s.is_ok()));

    let stages: Vec<String> = bus
        .history("preload.progress", 10)
        .iter()
        .map(|m| m["payload"]["stage"].as_str().unwrap().to_owned())
        .collect();
    assert!(stages.contains(&"verified".to_owned()));
    assert!(stages.contains(&"downloading".to_owned()));
    assert!(stages.contains(&"completed".to_owned()));
}

#[tokio::test]
async fn stale_files_are_replaced() {
    let base = serve(Arc::default()).await;
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("ngc.csv"), "outdated").unwrap();

    let manifest = ResourceManifest { resources: vec![entry("ngc.csv", format!("{base}/files/ngc.csv"), NGC)] };
    let preloader = preloader(root.path(), &MessageBus::new());

    let status = preloader.check(&manifest.resources[0]).await.unwrap();
    assert!(matches!(status, ResourceStatus::Mismatch { ref actual, .. } if *actual == sha256_bytes(b"outdated")));

    let report = preloader.preload(&manifest).await.unwrap();
    assert_eq!(report.downloaded, vec!["ngc.csv"]);
    assert_eq!(std::fs::read_to_string(root.path().join("ngc.csv")).unwrap(), NGC);
}

#[tokio::test]
async fn retries_until_the_server_recovers() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(Arc::clone(&hits)).await;
    let root = tempfile::tempdir().unwrap();
    let manifest = ResourceManifest { resources: vec![entry("flaky.txt", format!("{base}/flaky"), FLAKY)] };

    let report = preloader(root.path(), &MessageBus::new()).preload(&manifest).await.unwrap();
    assert_eq!(report.downloaded, vec!["flaky.txt"]);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failures_are_reported_and_leave_no_partial_files() {
    let base = serve(Arc::default()).await;
    let root = tempfile::tempdir().unwrap();
    let manifest = ResourceManifest {
        resources: vec![
            entry("gone.bin", format!("{base}/files/gone.bin"), "whatever"),
            entry("wrong.csv", format!("{base}/files/ngc.csv"), "not the served content"),
            ResourceEntry { size: Some(1), ..entry("short.csv", format!("{base}/files/ngc.csv"), NGC) },
        ],
    };
    let preloader = Preloader::builder(root.path(), Arc::new(ThreadPool::new(1).unwrap()))
        .retries(1)
        .backoff(Duration::from_millis(1))
        .build()
        .unwrap();

    let report = preloader.preload(&manifest).await.unwrap();
    assert!(!report.is_complete());
    let failed: Vec<&str> = report.failed.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(failed, vec!["gone.bin", "wrong.csv", "short.csv"]);
    assert!(report.failed[1].error.contains("Checksum"));

    let leftovers = std::fs::read_dir(root.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn paths_outside_the_root_are_rejected_up_front() {
    let root = tempfile::tempdir().unwrap();
    let manifest = ResourceManifest {
        resources: vec![entry("../escape.txt", "http://127.0.0.1:9/x".to_owned(), "x")],
    };
    let result = preloader(root.path(), &MessageBus::new()).preload(&manifest).await;
    assert!(matches!(result, Err(PreloadError::PathTraversal { .. })));
}

#[tokio::test]
async fn run_respects_the_enabled_flag() {
    let pool = Arc::new(ThreadPool::new(1).unwrap());
    let bus = MessageBus::new();
    let disabled = PreloadConfig::default();
    assert!(lithium_preload::run(&disabled, Arc::clone(&pool), &bus).await.unwrap().is_none());

    let base = serve(Arc::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("resources.toml");
    std::fs::write(
        &manifest,
        format!(
            "[[resources]]\npath = \"ngc.csv\"\nurl = \"{base}/files/ngc.csv\"\nsha256 = \"{}\"\n",
            sha256_bytes(NGC.as_bytes())
        ),
    )
    .unwrap();
    let enabled = PreloadConfig {
        enabled: true,
        manifest,
        root: dir.path().join("resources"),
        ..PreloadConfig::default()
    };
    let report = lithium_preload::run(&enabled, pool, &bus).await.unwrap().unwrap();
    assert_eq!(report.downloaded, vec!["ngc.csv"]);
    assert!(dir.path().join("resources/ngc.csv").is_file());
}
