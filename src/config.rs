use config::ConfigError;
use secrecy::Secret;
use serde::{de::DeserializeOwned, Deserialize};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_RECOGNITION_URL: &str = "http://localhost:5000";
const DEFAULT_RECOGNITION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Face recognition service
    pub recognition_service_url: String,
    pub recognition_api_key: Option<Secret<String>>,
    pub recognition_timeout_secs: u64,

    // Detection monitor
    pub detection_confidence_threshold: f64,
    pub detection_poll_interval_secs: u64,
    pub auto_detect: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self::from_settings(&config)
    }

    pub fn from_settings(config: &config::Config) -> Result<Self, ConfigError> {
        let parsed = Self {
            database_url: config.get("database_url")?,
            host: optional(config, "host")?.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: optional(config, "port")?.unwrap_or(DEFAULT_PORT),

            recognition_service_url: optional(config, "recognition_service_url")?
                .unwrap_or_else(|| DEFAULT_RECOGNITION_URL.to_string()),
            recognition_api_key: optional::<String>(config, "recognition_api_key")?
                .filter(|key| !key.is_empty())
                .map(Secret::new),
            recognition_timeout_secs: optional(config, "recognition_timeout_secs")?
                .unwrap_or(DEFAULT_RECOGNITION_TIMEOUT_SECS),

            detection_confidence_threshold: optional(config, "detection_confidence_threshold")?
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            detection_poll_interval_secs: optional(config, "detection_poll_interval_secs")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            auto_detect: optional(config, "auto_detect")?.unwrap_or(true),
        };

        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.recognition_service_url).map_err(|e| {
            ConfigError::Message(format!("recognition_service_url is invalid: {}", e))
        })?;

        if !(0.0..=1.0).contains(&self.detection_confidence_threshold) {
            return Err(ConfigError::Message(
                "detection_confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        if self.detection_poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "detection_poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reads a key that may be absent; present but unparsable values are errors
fn optional<T: DeserializeOwned>(
    config: &config::Config,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
