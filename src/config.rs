use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Playback controller configuration.
/// In debug builds `load` also reads a `.env` file before the environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Quiet period a buffering signal must hold before it becomes visible
    #[serde(with = "duration_ms")]
    pub debounce_window: Duration,
    /// Scrubber tick cadence while playing
    #[serde(with = "duration_ms")]
    pub tick_interval: Duration,
    /// Start times at or below this do not trigger the initial resume seek
    #[serde(with = "duration_ms")]
    pub min_resume_time: Duration,
    /// Stalls this close to the end of the item are not reported
    #[serde(with = "duration_ms")]
    pub stall_edge_margin: Duration,
    /// Start playing as soon as the item is ready
    pub autoplay: bool,
    /// Rate used by `play` until the user picks another
    pub default_rate: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(300),
            tick_interval: Duration::from_millis(500),
            min_resume_time: Duration::from_secs(1),
            stall_edge_margin: Duration::from_secs(1),
            autoplay: false,
            default_rate: 1.0,
        }
    }
}

impl PlayerConfig {
    /// Load configuration based on build mode
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: dev mode, loaded .env file");
            }
        }

        Self::from_env()
    }

    /// Load configuration from `VIDCTL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let millis = |key: &str| -> Result<Option<Duration>, ConfigError> {
            lookup(key)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|e| ConfigError::Invalid(format!("{}: {}", key, e)))
                })
                .transpose()
        };

        if let Some(value) = millis("VIDCTL_DEBOUNCE_MS")? {
            config.debounce_window = value;
        }
        if let Some(value) = millis("VIDCTL_TICK_MS")? {
            config.tick_interval = value;
        }
        if let Some(value) = millis("VIDCTL_MIN_RESUME_MS")? {
            config.min_resume_time = value;
        }
        if let Some(value) = millis("VIDCTL_STALL_MARGIN_MS")? {
            config.stall_edge_margin = value;
        }
        if let Some(value) = lookup("VIDCTL_AUTOPLAY") {
            config.autoplay = value.trim().eq_ignore_ascii_case("true") || value.trim() == "1";
        }
        if let Some(value) = lookup("VIDCTL_DEFAULT_RATE") {
            config.default_rate = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("VIDCTL_DEFAULT_RATE: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Config: loaded {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_window.is_zero() {
            return Err(ConfigError::Invalid(
                "Debounce window cannot be zero".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Tick interval cannot be zero".to_string(),
            ));
        }
        if !(self.default_rate.is_finite() && self.default_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "Default rate must be positive, got {}",
                self.default_rate
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
