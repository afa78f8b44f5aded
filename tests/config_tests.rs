//! Config file loading and validation

use nix::sys::signal::Signal;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use test_reaper::config::{Config, PatternKind};
use test_reaper::process::{discover, ProcessRecord, ProcessSnapshot};
use test_reaper::SupervisorError;

#[test]
fn test_full_config_round_trips_into_settings() {
    let toml = r#"
        grace_window_ms = 2500
        grace_signal = "SIGINT"
        kill_signal = "KILL"

        [[category]]
        name = "tox"
        pattern = "tox -e"
        kind = "substring"

        [[category]]
        name = "nox"
        pattern = "nox\\s+-s"
    "#;

    let config = Config::parse(toml).expect("config should parse");
    assert_eq!(config.categories.len(), 2);
    assert_eq!(config.categories[0].kind, PatternKind::Substring);
    assert_eq!(config.categories[1].kind, PatternKind::Regex);

    let settings = config.settings().expect("config should validate");
    assert_eq!(settings.policy.grace_window, Duration::from_millis(2500));
    assert_eq!(settings.policy.grace_signal, Signal::SIGINT);
    assert_eq!(settings.policy.kill_signal, Signal::SIGKILL);

    let snapshot = ProcessSnapshot::new(vec![
        ProcessRecord::new(10, "tox -e py311"),
        ProcessRecord::new(11, "nox  -s tests"),
        ProcessRecord::new(12, "pytest"),
    ]);
    let categories = settings.patterns.categories();
    assert_eq!(discover(&snapshot, &categories[0].rule).len(), 1);
    assert_eq!(discover(&snapshot, &categories[1].rule)[0].pid, 11);
}

#[test]
fn test_partial_config_keeps_defaults() {
    let config = Config::parse("grace_window_ms = 50").unwrap();
    let settings = config.settings().unwrap();

    assert_eq!(settings.policy.grace_window, Duration::from_millis(50));
    assert_eq!(settings.policy.grace_signal, Signal::SIGTERM);
    assert_eq!(settings.policy.kill_signal, Signal::SIGKILL);
    let names: Vec<&str> = settings
        .patterns
        .categories()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["worker", "runner", "generic"]);
}

#[test]
fn test_invalid_regex_is_a_config_error() {
    let config = Config::parse(
        r#"
        [[category]]
        name = "broken"
        pattern = "pytest("
        "#,
    )
    .unwrap();

    match config.settings() {
        Err(SupervisorError::InvalidPattern { category, .. }) => assert_eq!(category, "broken"),
        other => panic!("expected InvalidPattern, got {other:?}"),
    }
}

#[test]
fn test_unknown_signal_is_rejected() {
    let config = Config::parse(r#"kill_signal = "SIGBOGUS""#).unwrap();
    assert!(matches!(
        config.settings(),
        Err(SupervisorError::InvalidSignal(_))
    ));
}

#[test]
fn test_malformed_toml_is_a_config_error() {
    assert!(matches!(
        Config::parse("grace_window_ms = \"soon\""),
        Err(SupervisorError::Config(_))
    ));
}

#[test]
fn test_load_from_explicit_path() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("test-reaper.toml");
    fs::write(&path, "grace_window_ms = 10\n")?;

    let config = Config::load(Some(&path));
    assert_eq!(config.grace_window_ms, 10);
    Ok(())
}

#[test]
fn test_load_falls_back_to_defaults_on_bad_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "this is = = not toml")?;

    let config = Config::load(Some(&path));
    assert_eq!(config.grace_window_ms, 1000);
    assert_eq!(config.categories.len(), 3);
    Ok(())
}

#[test]
fn test_load_missing_explicit_path_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load(Some(&temp_dir.path().join("absent.toml")));
    assert_eq!(config.grace_signal, "SIGTERM");
}

#[test]
fn test_default_config_serializes_to_loadable_toml() {
    let rendered = toml::to_string(&Config::default()).unwrap();
    let reparsed = Config::parse(&rendered).unwrap();
    assert!(reparsed.settings().is_ok());
    assert!(rendered.contains("[[category]]"));
}
