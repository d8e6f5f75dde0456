use std::collections::HashMap;
use std::time::Duration;

use cohost::config::{CohostConfig, VoiceBackend};
use cohost::error::ConfigError;

#[test]
fn test_defaults() {
    let config = CohostConfig::default();
    assert_eq!(config.tick_interval(), Duration::from_secs(1));
    assert_eq!(config.max_queue_size, 1000);
    assert_eq!(config.decisions_per_minute, 50);
    assert_eq!(config.interruption_grace(), Duration::from_secs(2));
    assert_eq!(config.voice, VoiceBackend::Console);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let raw = r#"
        tick_interval_seconds = 0.5
        decisions_per_minute = 10
        voice = "say"

        [llm]
        base_url = "http://gpu-box:8080"
    "#;
    let config = CohostConfig::from_toml_str(raw, "inline").unwrap();

    assert_eq!(config.tick_interval(), Duration::from_millis(500));
    assert_eq!(config.decisions_per_minute, 10);
    assert_eq!(config.voice, VoiceBackend::Say);
    assert_eq!(config.llm.base_url, "http://gpu-box:8080");
    assert_eq!(config.llm.n_predict, 128);
    assert_eq!(config.max_queue_size, 1000);
}

#[test]
fn test_bad_toml_is_parse_error() {
    let err = CohostConfig::from_toml_str("max_queue_size = \"lots\"", "inline").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == "inline"));
}

#[test]
fn test_missing_file_means_defaults() {
    let config =
        CohostConfig::from_path(std::path::Path::new("/nonexistent/cohost.toml")).unwrap();
    assert_eq!(config, CohostConfig::default());
}

#[test]
fn test_environment_overrides() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("COHOST_MAX_QUEUE_SIZE", "64"),
        ("COHOST_INTERRUPTION_GRACE_SECONDS", "0.25"),
        ("COHOST_LLM_URL", "http://127.0.0.1:9000"),
        ("COHOST_LOG_LEVEL", "debug"),
    ]);
    let mut config = CohostConfig::default();
    config
        .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.max_queue_size, 64);
    assert_eq!(config.interruption_grace(), Duration::from_millis(250));
    assert_eq!(config.llm.base_url, "http://127.0.0.1:9000");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.decisions_per_minute, 50);
}

#[test]
fn test_unparsable_override_is_rejected() {
    let mut config = CohostConfig::default();
    let err = config
        .apply_overrides(|key| (key == "COHOST_DECISIONS_PER_MINUTE").then(|| "many".to_string()))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            key: "decisions_per_minute",
            ..
        }
    ));
}

#[test]
fn test_validate_rejects_nonsense() {
    let cases = [
        CohostConfig {
            tick_interval_seconds: 0.0,
            ..CohostConfig::default()
        },
        CohostConfig {
            tick_interval_seconds: f64::NAN,
            ..CohostConfig::default()
        },
        CohostConfig {
            interruption_grace_seconds: -1.0,
            ..CohostConfig::default()
        },
        CohostConfig {
            max_queue_size: 0,
            ..CohostConfig::default()
        },
        CohostConfig {
            decisions_per_minute: 0,
            ..CohostConfig::default()
        },
    ];
    for config in cases {
        assert!(config.validate().is_err(), "{:?} should be invalid", config);
    }

    let zero_grace = CohostConfig {
        interruption_grace_seconds: 0.0,
        ..CohostConfig::default()
    };
    assert!(zero_grace.validate().is_ok());
}

#[test]
fn test_greeting_and_farewell_can_be_skipped() {
    let config = CohostConfig::default();
    assert!(config.greeting().is_some());
    assert!(config.farewell().is_some());
    assert_eq!(config.idle_commentary(), Duration::from_secs(20));

    let raw = r#"
        greeting = ""
        farewell = "   "
        idle_commentary_seconds = 45.0
    "#;
    let config = CohostConfig::from_toml_str(raw, "inline").unwrap();
    assert_eq!(config.greeting(), None);
    assert_eq!(config.farewell(), None);
    assert_eq!(config.idle_commentary(), Duration::from_secs(45));
}

#[test]
fn test_negative_idle_commentary_is_invalid() {
    let config = CohostConfig {
        idle_commentary_seconds: -1.0,
        ..CohostConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidValue {
            key: "idle_commentary_seconds",
            ..
        })
    ));
}
