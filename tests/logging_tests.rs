//! Logging initialization test
//!
//! Lives in its own test binary: `init_logging` installs the global tracing
//! subscriber, which a process can only do once.

use linkshard::config::LoggingConfig;
use linkshard::system::logging::init_logging;
use tempfile::TempDir;
use tracing::info;

#[test]
fn test_file_logging_writes_through_non_blocking_worker() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_path = temp_dir.path().join("registry.log");

    let config = LoggingConfig {
        level: "info".to_string(),
        format: "text".to_string(),
        file: Some(log_path.display().to_string()),
        max_backups: 3,
        enable_rotation: false,
    };

    let guard = init_logging(&config);
    info!("logging smoke line");

    // guard 落下时阻塞到后台写线程刷完
    drop(guard);

    let contents = std::fs::read_to_string(&log_path).expect("log file should exist");
    assert!(contents.contains("logging smoke line"));
    assert!(contents.contains("INFO"));
}
