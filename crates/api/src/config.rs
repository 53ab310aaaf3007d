//! Application configuration
//!
//! Loaded from an optional TOML file, then overridden by `VISION__*`
//! environment variables (`VISION__PIPELINE__WIDTH=1280`).

use alerting::AlertConfig;
use camera_capture::SourceConfig;
use config::{Config, Environment, File};
use detection::DetectorConfig;
use pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use storage::RetentionConfig;

/// Default config file name (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_FILE: &str = "vision";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// tracing max level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Every component's settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub detector: DetectorConfig,
    pub pipeline: PipelineConfig,
    pub alerts: AlertConfig,
    pub retention: RetentionConfig,
    /// Source opened by `/start_camera` when the request names none
    pub source: SourceConfig,
}

impl AppConfig {
    /// Load `file` (or `vision.*` when `None`) if present, then the environment
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::with_name(file.unwrap_or(DEFAULT_CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix("VISION")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
