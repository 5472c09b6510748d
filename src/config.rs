use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

use crate::estimation::EstimatorConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const CONFIG_PATH_ENV: &str = "QUEUEVIEW_CONFIG";
pub const STORE_USERNAME_ENV: &str = "QUEUEVIEW_STORE_USERNAME";
pub const STORE_PASSWORD_ENV: &str = "QUEUEVIEW_STORE_PASSWORD";

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_WINDOW_DURATION_MS: u64 = 60 * 60 * 1_000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WAIT_MULTIPLIER: f64 = 2.5;
pub const DEFAULT_PROCESSING_TIME_SCALING_FACTOR: f64 = 5.0;

const MAX_LABEL_OFFSET_MINUTES: i32 = 23 * 60 + 59;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub store: StoreSection,
    #[serde(default)]
    pub polling: Option<PollingSection>,
    #[serde(default)]
    pub estimation: Option<EstimationSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    /// Base URL of the store, e.g. `http://127.0.0.1:5984`
    pub base_url: String,
    /// Collection holding the occupancy events
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Request timeout in milliseconds (default: 10000)
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingSection {
    /// Period between poll cycles (default: 1000)
    pub interval_ms: Option<u64>,
    /// Trailing retention window (default: one hour)
    pub window_duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimationSection {
    pub wait_multiplier: Option<f64>,
    pub processing_time_scaling_factor: Option<f64>,
    /// Offset applied when rendering point labels (default: UTC)
    pub label_utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

/// Loads the file named by `QUEUEVIEW_CONFIG`, or the default path, then
/// applies credential overrides from the environment.
pub fn load_from_env() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = load_from_path(path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse(&contents)
}

pub fn parse(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(STORE_USERNAME_ENV) {
            self.store.username = Some(username);
        }
        if let Some(password) = lookup(STORE_PASSWORD_ENV) {
            self.store.password = Some(password);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store.base_url is empty".to_string()));
        }
        if self.store.database.trim().is_empty() {
            return Err(ConfigError::Invalid("store.database is empty".to_string()));
        }
        if self.poll_interval().is_zero() {
            return Err(ConfigError::Invalid(
                "polling.interval_ms must be positive".to_string(),
            ));
        }
        if self.window_duration().is_zero() {
            return Err(ConfigError::Invalid(
                "polling.window_duration_ms must be positive".to_string(),
            ));
        }
        if self.store_timeout().is_zero() {
            return Err(ConfigError::Invalid(
                "store.timeout_ms must be positive".to_string(),
            ));
        }

        let estimation = self.estimation.as_ref();
        for (name, value) in [
            (
                "wait_multiplier",
                estimation.and_then(|e| e.wait_multiplier),
            ),
            (
                "processing_time_scaling_factor",
                estimation.and_then(|e| e.processing_time_scaling_factor),
            ),
        ] {
            if let Some(value) = value
                && (!value.is_finite() || value < 0.0)
            {
                return Err(ConfigError::Invalid(format!(
                    "estimation.{name} must be a finite non-negative number, got {value}"
                )));
            }
        }

        let offset = self.label_offset_minutes();
        if offset.abs() > MAX_LABEL_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "estimation.label_utc_offset_minutes out of range: {offset}"
            )));
        }
        Ok(())
    }

    /// Returns the all-documents endpoint of the configured collection.
    pub fn store_endpoint(&self) -> String {
        format!(
            "{}/{}/_all_docs",
            self.store.base_url.trim_end_matches('/'),
            self.store.database.trim_matches('/')
        )
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS))
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn poll_interval(&self) -> Duration {
        let ms = self
            .polling
            .as_ref()
            .and_then(|p| p.interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    pub fn window_duration(&self) -> Duration {
        let ms = self
            .polling
            .as_ref()
            .and_then(|p| p.window_duration_ms)
            .unwrap_or(DEFAULT_WINDOW_DURATION_MS);
        Duration::from_millis(ms)
    }

    fn label_offset_minutes(&self) -> i32 {
        self.estimation
            .as_ref()
            .and_then(|e| e.label_utc_offset_minutes)
            .unwrap_or(0)
    }

    pub fn estimator_config(&self) -> EstimatorConfig {
        let section = self.estimation.as_ref();
        // Range is checked in validate(); UTC is only reachable for configs built by hand.
        let label_offset =
            UtcOffset::from_whole_seconds(self.label_offset_minutes() * 60).unwrap_or(UtcOffset::UTC);
        EstimatorConfig {
            wait_multiplier: section
                .and_then(|e| e.wait_multiplier)
                .unwrap_or(DEFAULT_WAIT_MULTIPLIER),
            processing_time_scaling_factor: section
                .and_then(|e| e.processing_time_scaling_factor)
                .unwrap_or(DEFAULT_PROCESSING_TIME_SCALING_FACTOR),
            label_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const MINIMAL: &str = r#"
[app]
name = "queueview"

[logging]
level = "info"

[store]
base_url = "http://127.0.0.1:5984/"
database = "terminal_images"
"#;

    #[test]
    fn default_config_is_loadable() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert_eq!(config.store.database, "terminal_images");
        Ok(())
    }

    #[test]
    fn missing_optional_sections_use_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = parse(MINIMAL)?;

        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.window_duration(), Duration::from_secs(3600));
        assert_eq!(config.store_timeout(), Duration::from_secs(10));

        let estimator = config.estimator_config();
        assert_eq!(estimator.wait_multiplier, DEFAULT_WAIT_MULTIPLIER);
        assert_eq!(
            estimator.processing_time_scaling_factor,
            DEFAULT_PROCESSING_TIME_SCALING_FACTOR
        );
        assert_eq!(estimator.label_offset, UtcOffset::UTC);
        Ok(())
    }

    #[test]
    fn store_endpoint_joins_base_url_and_database() -> Result<(), Box<dyn std::error::Error>> {
        let config = parse(MINIMAL)?;
        assert_eq!(
            config.store_endpoint(),
            "http://127.0.0.1:5984/terminal_images/_all_docs"
        );
        Ok(())
    }

    #[test]
    fn tuned_deployment_values_are_read() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{MINIMAL}
[polling]
interval_ms = 5000
window_duration_ms = 18000000

[estimation]
wait_multiplier = 1.7
processing_time_scaling_factor = 2.0
label_utc_offset_minutes = -300
"
        );
        let config = parse(&contents)?;

        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.window_duration(), Duration::from_secs(5 * 3600));
        let estimator = config.estimator_config();
        assert_eq!(estimator.wait_multiplier, 1.7);
        assert_eq!(estimator.processing_time_scaling_factor, 2.0);
        assert_eq!(estimator.label_offset.whole_hours(), -5);
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() {
        let contents = format!("{MINIMAL}\n[polling]\ninterval_ms = 0\n");
        assert!(matches!(parse(&contents), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let contents = format!("{MINIMAL}\n[estimation]\nwait_multiplier = -1.0\n");
        assert!(matches!(parse(&contents), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_label_offset_is_rejected() {
        let contents = format!("{MINIMAL}\n[estimation]\nlabel_utc_offset_minutes = 1440\n");
        assert!(matches!(parse(&contents), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn credential_overrides_replace_file_values() -> Result<(), Box<dyn std::error::Error>> {
        let mut config = parse(MINIMAL)?;
        config.apply_overrides(|key| match key {
            STORE_USERNAME_ENV => Some("reader".to_string()),
            STORE_PASSWORD_ENV => Some("s3cret".to_string()),
            _ => None,
        });

        assert_eq!(config.store.username.as_deref(), Some("reader"));
        assert_eq!(config.store.password.as_deref(), Some("s3cret"));
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let temp_dir = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = temp_dir.join(format!("queueview-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = std::env::temp_dir();
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = temp_dir.join(format!("queueview-config-invalid-{unique}.toml"));
        fs::write(&path, "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
