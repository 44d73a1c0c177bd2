use super::data::{path_display, Config};
use super::defaults::{DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL};
use super::io::{config_path_from, ConfigError};
use crate::core::orchestrator::{OverlapPolicy, RegeneratePolicy};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.effective_base_url(), DEFAULT_BASE_URL);
    assert_eq!(config.effective_model(), DEFAULT_MODEL);
    assert_eq!(
        config.effective_connect_timeout(),
        Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
    );
    assert!(!config.native_regenerate_enabled());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let config = Config {
        base_url: Some("https://answers.example.com".to_string()),
        default_model: Some("llama3".to_string()),
        data_sources: vec!["handbook.pdf".to_string(), "faq.md".to_string()],
        regenerate: Some(RegeneratePolicy::ReuseUserTurn),
        overlap: Some(OverlapPolicy::CancelPrevious),
        connect_timeout_secs: Some(3),
        native_regenerate: Some(true),
    };
    config.save_to_path(&config_path).expect("Failed to save config");

    let contents = std::fs::read_to_string(&config_path).expect("Failed to read config");
    assert!(contents.contains("regenerate = \"reuse-user-turn\""));
    assert!(contents.contains("overlap = \"cancel-previous\""));

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);

    let cleared = Config {
        default_model: None,
        ..loaded
    };
    cleared.save_to_path(&config_path).expect("Failed to save config");
    let reloaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(reloaded.default_model, None);
    assert_eq!(reloaded.effective_model(), DEFAULT_MODEL);
    assert_eq!(reloaded.data_sources.len(), 2);
}

#[test]
fn test_parse_error_names_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "overlap = \"sometimes\"\n").expect("write failed");

    let err = Config::load_from_path(&config_path).expect_err("bad policy should fail");

    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(&path_display(&config_path)));
}

#[test]
fn test_unreadable_path_is_a_read_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    // A directory exists but cannot be read as a file.
    let err = Config::load_from_path(temp_dir.path()).expect_err("directory should fail");

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_orchestrator_settings_follow_config() {
    let config: Config = toml::from_str(
        r#"
default_model = "mistral"
data_sources = ["a.pdf"]
regenerate = "reuse-user-turn"
"#,
    )
    .expect("parse failed");

    let settings = config.orchestrator_settings();

    assert_eq!(settings.model, "mistral");
    assert_eq!(settings.data_sources, vec!["a.pdf".to_string()]);
    assert_eq!(settings.regenerate, RegeneratePolicy::ReuseUserTurn);
    assert_eq!(settings.overlap, OverlapPolicy::Reject);
}

#[test]
fn test_config_dir_override_wins() {
    let path = config_path_from(Some(OsString::from("/tmp/parley-test")));
    assert_eq!(path, Some(PathBuf::from("/tmp/parley-test/config.toml")));
}

#[test]
fn test_empty_override_falls_back_to_platform_dir() {
    let fallback = config_path_from(Some(OsString::new()));
    assert_eq!(fallback, config_path_from(None));
    if let Some(path) = fallback {
        assert!(path.ends_with("config.toml"));
    }
}

#[test]
fn test_policy_names_round_trip_through_text() {
    for policy in RegeneratePolicy::ALL {
        assert_eq!(policy.as_str().parse::<RegeneratePolicy>(), Ok(policy));
    }
    assert_eq!(
        " Cancel-Previous ".parse::<OverlapPolicy>(),
        Ok(OverlapPolicy::CancelPrevious)
    );
    assert!("sometimes".parse::<OverlapPolicy>().is_err());
}
