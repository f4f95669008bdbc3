use super::*;
use tempfile::tempdir;

#[test]
fn test_embedded_config_parses_and_matches_defaults() {
    let parsed: EngineConfig = serde_yaml::from_str(DEFAULT_ENGINE_YAML).expect("embedded yaml");
    assert_eq!(parsed, EngineConfig::default());
    assert_eq!(EngineConfig::default_config(), EngineConfig::default());
}

#[test]
fn test_default_config_validates() {
    assert!(EngineConfig::default_config().validate().is_ok());
}

#[test]
fn test_partial_yaml_uses_defaults() {
    let config = EngineConfig::from_yaml(
        r#"
actor:
  debug: true
journal:
  snapshot_every: 5
"#,
    )
    .expect("parse");

    assert!(config.actor.debug);
    assert_eq!(config.actor.idle_period_secs, 600);
    assert_eq!(config.journal.snapshot_every, 5);
    assert_eq!(config.journal.snapshot_delay_ms, 2000);
    assert_eq!(config.timer_service.actor_id, "timer-service");
}

#[test]
fn test_validation_rejects_zero_poll_interval() {
    let err = EngineConfig::from_yaml("timer_service:\n  poll_interval_ms: 0\n").unwrap_err();
    assert!(format!("{err:#}").contains("poll_interval_ms"));
}

#[test]
fn test_load_from_file() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("engine.yaml");
    std::fs::write(&path, "case:\n  max_transition_iterations: 42\n").expect("write");

    let config = EngineConfig::load(&path).expect("load");
    assert_eq!(config.case.max_transition_iterations, 42);
}

#[test]
fn test_load_missing_file_names_path() {
    let err = EngineConfig::load(Path::new("/nonexistent/engine.yaml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/engine.yaml"));
}

#[test]
fn test_idle_period_zero_disables_passivation() {
    let mut config = EngineConfig::default();
    config.actor.idle_period_secs = 0;
    assert_eq!(config.idle_period(), None);
}
