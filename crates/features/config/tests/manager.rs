use lithium_config::{ConfigError, ConfigManager};
use lithium_domain::config::AppConfig;
use lithium_domain::events::{ConfigAction, ConfigChanged};
use lithium_message_bus::MessageBus;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

fn read(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn mutations_are_announced() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe::<ConfigChanged>("config.changed").unwrap();
    let config = ConfigManager::builder().bus(bus.clone()).build();

    config.set("site.latitude", json!(50.45)).unwrap();
    config.merge(json!({ "site": { "longitude": 30.52 } }));
    assert!(!config.delete("site/elevation").unwrap());
    assert!(config.delete("site/latitude").unwrap());
    config.clear();

    let expected = [
        ("site/latitude", ConfigAction::Set),
        ("", ConfigAction::Merge),
        ("site/latitude", ConfigAction::Delete),
        ("", ConfigAction::Clear),
    ];
    for (path, action) in expected {
        let message = rx.recv().await.unwrap();
        assert_eq!(message.payload, ConfigChanged { path: path.to_owned(), action });
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.history("config.changed", 10).len(), 4);
}

#[tokio::test]
async fn failed_set_leaves_document_untouched() {
    let config = ConfigManager::builder().document(json!({ "gain": 100 })).build();
    let err = config.set("gain/value", json!(1)).unwrap_err();
    assert!(matches!(err, ConfigError::TypeConflict { .. }));
    assert_eq!(config.snapshot(), json!({ "gain": 100 }));
}

#[tokio::test]
async fn load_dir_merges_by_file_stem() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("site.json"), r#"{ "name": "backyard", "bortle": 5 }"#).unwrap();
    std::fs::write(dir.path().join("readme.md"), "# not config").unwrap();
    std::fs::create_dir(dir.path().join("profiles")).unwrap();
    std::fs::write(dir.path().join("profiles/camera.json"), r#"{ "gain": 120 }"#).unwrap();

    let config = ConfigManager::new();
    assert_eq!(config.load_dir(dir.path(), false).await.unwrap(), 1);
    assert_eq!(config.load_dir(dir.path(), true).await.unwrap(), 2);
    assert_eq!(config.get("site/name").unwrap(), Some(json!("backyard")));
    assert_eq!(config.get("camera.gain").unwrap(), Some(json!(120)));

    std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
    assert!(matches!(config.load_dir(dir.path(), false).await, Err(ConfigError::Json { .. })));
}

#[tokio::test]
async fn load_file_at_root_and_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lithium.json");
    std::fs::write(&file, r#"{ "server": { "port": 9000 } }"#).unwrap();

    let config = ConfigManager::builder().document(json!({ "server": { "address": "::" } })).build();
    config.load_file_at_root(&file).await.unwrap();
    assert_eq!(config.snapshot(), json!({ "server": { "address": "::", "port": 9000 } }));

    let missing = config.load_file(dir.path().join("absent.json")).await;
    assert!(matches!(missing, Err(ConfigError::Io { .. })));
}

#[tokio::test]
async fn save_writes_pretty_json_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/store.json");
    let config = ConfigManager::builder().document(json!({ "b": 1, "a": [true] })).build();

    config.save(&target).await.unwrap();
    let text = std::fs::read_to_string(&target).unwrap();
    assert!(text.contains('\n'));
    assert_eq!(read(&target), json!({ "b": 1, "a": [true] }));

    let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name.to_string_lossy().contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn autosave_follows_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("autosave.json");
    let config = ConfigManager::builder().autosave(&target).build();

    config.set("focus/position", json!(25_000)).unwrap();
    config.set("focus/temperature", json!(4.5)).unwrap();

    let expected = json!({ "focus": { "position": 25_000, "temperature": 4.5 } });
    for _ in 0..100 {
        if target.exists() && read(&target) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("autosave never caught up");
}

#[tokio::test]
async fn init_loads_store_and_arms_autosave() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("site.json"), r#"{ "name": "dome" }"#).unwrap();
    let file = dir.path().join("state.json");
    std::fs::write(&file, r#"{ "session": 3 }"#).unwrap();

    let mut app = AppConfig::default();
    app.store.dir = Some(dir.path().to_path_buf());
    app.store.file = Some(file.clone());
    app.store.autosave = true;

    let (slice, manager) = lithium_config::init(&app, &MessageBus::new()).await.unwrap();
    assert_eq!(slice.name(), "ConfigStore");
    assert_eq!(manager.get("site/name").unwrap(), Some(json!("dome")));
    assert_eq!(manager.get("session").unwrap(), Some(json!(3)));
    assert_eq!(manager.autosave_path(), Some(file.as_path()));
}
