use lithium_logger::{LevelFilter, Logger, Rotation};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn json_file_logging_writes_lines() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let log_dir = tmp_dir.path().join("logs");

    let logger = Logger::builder()
        .name("lithium-file")
        .console(false)
        .level(LevelFilter::INFO)
        .path(&log_dir)
        .rotation(Rotation::NEVER)
        .max_files(2)
        .json()
        .init()?;
    assert!(logger.has_file_output());

    tracing::info!(topic = "device.added", "hello from the file test");

    std::thread::sleep(Duration::from_millis(50));
    drop(logger);

    let log_file = fs::read_dir(&log_dir)?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|ext| ext.to_str()) == Some("log"))
        .expect("log file should be created");

    let content = fs::read_to_string(&log_file)?;
    let first = content.lines().find(|l| l.contains("hello from the file test")).expect("line");
    let parsed: serde_json::Value = serde_json::from_str(first)?;
    assert_eq!(parsed["fields"]["topic"], "device.added");

    Ok(())
}
