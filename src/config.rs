//! Startup configuration: TOML file, then environment overrides, then
//! validation.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "cohost.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceBackend {
    /// Simulated playback, logged to the console.
    #[default]
    Console,
    /// The system `say` command.
    Say,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub n_predict: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            n_predict: 128,
            temperature: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohostConfig {
    pub tick_interval_seconds: f64,
    pub max_queue_size: usize,
    pub decisions_per_minute: u32,
    /// Shutdown grace for in-flight speech.
    pub interruption_grace_seconds: f64,
    /// How long CRITICAL/HIGH events may wait for a decision slot.
    pub decision_max_wait_seconds: f64,
    pub decision_timeout_seconds: f64,
    /// MEDIUM/LOW events older than this are dropped when popped.
    pub max_event_age_seconds: f64,
    /// Streamer silence after which LISTENING decays to IDLE.
    pub listening_window_seconds: f64,
    /// Minimum quiet time before a TICK may ask for idle commentary.
    pub idle_commentary_seconds: f64,
    /// Spoken once on startup. Empty skips it.
    pub greeting: String,
    /// Spoken while draining, within the grace period. Empty skips it.
    pub farewell: String,
    pub context_events: usize,
    pub log_level: String,
    pub llm: LlmConfig,
    pub voice: VoiceBackend,
}

impl Default for CohostConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 1.0,
            max_queue_size: 1000,
            decisions_per_minute: 50,
            interruption_grace_seconds: 2.0,
            decision_max_wait_seconds: 5.0,
            decision_timeout_seconds: 10.0,
            max_event_age_seconds: 30.0,
            listening_window_seconds: 3.0,
            idle_commentary_seconds: 20.0,
            greeting: "Hello everyone! Co-host is online.".to_string(),
            farewell: "Bye chat, see you soon!".to_string(),
            context_events: 20,
            log_level: "info".to_string(),
            llm: LlmConfig::default(),
            voice: VoiceBackend::default(),
        }
    }
}

impl CohostConfig {
    /// `COHOST_CONFIG` (or `cohost.toml`), environment overrides, validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("COHOST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_path(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let label = path.display().to_string();
        if !path.exists() {
            info!("No config at {}, using defaults", label);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: label.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&raw, &label)?;
        info!("Config loaded from {}", label);
        Ok(config)
    }

    pub fn from_toml_str(raw: &str, label: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: label.to_string(),
            source,
        })
    }

    /// `lookup` maps an environment variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("COHOST_TICK_INTERVAL_SECONDS") {
            self.tick_interval_seconds = parse_value("tick_interval_seconds", &v)?;
        }
        if let Some(v) = lookup("COHOST_MAX_QUEUE_SIZE") {
            self.max_queue_size = parse_value("max_queue_size", &v)?;
        }
        if let Some(v) = lookup("COHOST_DECISIONS_PER_MINUTE") {
            self.decisions_per_minute = parse_value("decisions_per_minute", &v)?;
        }
        if let Some(v) = lookup("COHOST_INTERRUPTION_GRACE_SECONDS") {
            self.interruption_grace_seconds = parse_value("interruption_grace_seconds", &v)?;
        }
        if let Some(v) = lookup("COHOST_IDLE_COMMENTARY_SECONDS") {
            self.idle_commentary_seconds = parse_value("idle_commentary_seconds", &v)?;
        }
        if let Some(v) = lookup("COHOST_LLM_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("COHOST_LOG_LEVEL") {
            self.log_level = v;
        }
        debug!("Config after overrides: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("tick_interval_seconds", self.tick_interval_seconds),
            ("decision_timeout_seconds", self.decision_timeout_seconds),
            ("max_event_age_seconds", self.max_event_age_seconds),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(key, value));
            }
        }

        let non_negative = [
            ("interruption_grace_seconds", self.interruption_grace_seconds),
            ("decision_max_wait_seconds", self.decision_max_wait_seconds),
            ("listening_window_seconds", self.listening_window_seconds),
            ("idle_commentary_seconds", self.idle_commentary_seconds),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, value));
            }
        }

        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size", self.max_queue_size));
        }
        if self.decisions_per_minute == 0 {
            return Err(invalid("decisions_per_minute", self.decisions_per_minute));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(invalid("llm.base_url", "<empty>"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        seconds(self.tick_interval_seconds)
    }

    pub fn interruption_grace(&self) -> Duration {
        seconds(self.interruption_grace_seconds)
    }

    pub fn decision_max_wait(&self) -> Duration {
        seconds(self.decision_max_wait_seconds)
    }

    pub fn decision_timeout(&self) -> Duration {
        seconds(self.decision_timeout_seconds)
    }

    pub fn max_event_age(&self) -> Duration {
        seconds(self.max_event_age_seconds)
    }

    pub fn listening_window(&self) -> Duration {
        seconds(self.listening_window_seconds)
    }

    pub fn idle_commentary(&self) -> Duration {
        seconds(self.idle_commentary_seconds)
    }

    pub fn greeting(&self) -> Option<&str> {
        non_blank(&self.greeting)
    }

    pub fn farewell(&self) -> Option<&str> {
        non_blank(&self.farewell)
    }
}

// Unvalidated negatives and NaN collapse to zero instead of panicking.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn non_blank(line: &str) -> Option<&str> {
    let line = line.trim();
    (!line.is_empty()).then_some(line)
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| invalid(key, raw))
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}
