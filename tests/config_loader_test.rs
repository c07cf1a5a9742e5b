//! Configuration loading from files and the environment.

use std::io::Write;

use approvalflow::infrastructure::logging::{LogConfig, LogFormat, RotationPolicy};
use approvalflow::ConfigLoader;

#[test]
fn test_environment_overrides_defaults() {
    temp_env::with_vars(
        [
            ("APPROVALFLOW_NOTIFIER__WORKERS", Some("9")),
            ("APPROVALFLOW_LOGGING__LEVEL", Some("debug")),
            ("APPROVALFLOW_DATABASE__PATH", Some("/tmp/approvalflow-env.db")),
        ],
        || {
            let config = ConfigLoader::load().expect("config should load");
            assert_eq!(config.notifier.workers, 9);
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.database.path, "/tmp/approvalflow-env.db");
            assert_eq!(config.engine.sweep_interval_secs, 60, "untouched default");
        },
    );
}

#[test]
fn test_environment_values_are_validated() {
    temp_env::with_var("APPROVALFLOW_ENGINE__SWEEP_INTERVAL_SECS", Some("0"), || {
        let err = ConfigLoader::load().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    });
}

#[test]
fn test_load_from_file_feeds_logger_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "logging:\n  level: warn\n  format: pretty\n  rotation: never\n  log_dir: /var/log/approvalflow\nnotifier:\n  default_webhooks:\n    - url: https://hooks.example.com/flow\n      events: [timeout]"
    )
    .unwrap();
    file.flush().unwrap();

    let config = ConfigLoader::load_from_file(file.path()).unwrap();
    assert_eq!(config.notifier.default_webhooks.len(), 1);
    assert_eq!(config.notifier.workers, 4, "defaults fill the rest");

    let log = LogConfig::from(&config.logging);
    assert_eq!(log.level, "warn");
    assert_eq!(log.format, LogFormat::Pretty);
    assert_eq!(log.rotation, RotationPolicy::Never);
    assert_eq!(
        log.log_dir.as_deref(),
        Some(std::path::Path::new("/var/log/approvalflow"))
    );
}

#[test]
fn test_load_from_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigLoader::load_from_file(dir.path().join("absent.yaml")).unwrap();
    assert_eq!(config.database.path, ".approvalflow/approvalflow.db");
}
