// tests/config_loading.rs

use std::io::Write;

use tempfile::NamedTempFile;

use dagplan::config::{default_config_path, load_and_validate, load_from_path};
use dagplan::errors::PlanError;
use dagplan::types::LogLevel;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_round_trips_into_accessors() {
    let file = config_file(
        r#"
[plan]
iteration_base = "run"
max_iterations = 4

[process]
group_size = 8
collective_timeout_ms = 1500

[logging]
level = "debug"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.iteration_base(), "run");
    assert_eq!(cfg.max_iterations(), 4);
    assert_eq!(cfg.group_size(), 8);
    assert_eq!(cfg.collective_timeout().as_millis(), 1500);
    assert_eq!(cfg.log_level(), Some(LogLevel::Debug));
}

#[test]
fn raw_loading_skips_validation() {
    let file = config_file("[process]\ngroup_size = 0\n");

    let raw = load_from_path(file.path()).unwrap();
    assert_eq!(raw.process.group_size, 0);

    match load_and_validate(file.path()) {
        Err(PlanError::ConfigError(msg)) => assert!(msg.contains("group_size")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_timeout_is_rejected() {
    let file = config_file("[process]\ncollective_timeout_ms = 0\n");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(PlanError::ConfigError(_))
    ));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = config_file("[plan\nmax_iterations = 2\n");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(PlanError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(load_and_validate(&path), Err(PlanError::IoError(_))));
}

#[test]
fn default_path_is_project_local() {
    assert_eq!(default_config_path().to_str(), Some("Dagplan.toml"));
}
