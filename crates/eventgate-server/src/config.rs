//! Service configuration loading from file and environment variables.

use eventgate_log::KafkaSettings;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable log settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which log implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    #[default]
    Kafka,
    /// In-process log. Records are lost on exit.
    Memory,
}

impl std::str::FromStr for BrokerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(Self::Kafka),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown broker backend: {other}")),
        }
    }
}

/// Durable log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub backend: BrokerBackend,

    /// Bootstrap broker addresses.
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,

    /// Retries for a transiently failed publish.
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Bound on broker metadata requests at startup and tail open.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long the Kafka client may hold an unacknowledged record,
    /// retries included, before the publish fails.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Bound on waiting for a publish acknowledgment. Unset waits forever.
    #[serde(default)]
    pub publish_timeout_ms: Option<u64>,
}

impl BrokerConfig {
    /// Settings for the Kafka backend.
    pub fn kafka_settings(&self) -> KafkaSettings {
        KafkaSettings {
            brokers: self.brokers.clone(),
            publish_retries: self.publish_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            delivery_timeout_ms: self.delivery_timeout_ms,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "eventgate_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8082
}

fn default_brokers() -> Vec<String> {
    KafkaSettings::default().brokers
}

fn default_publish_retries() -> u32 {
    KafkaSettings::default().publish_retries
}

fn default_retry_backoff_ms() -> u64 {
    KafkaSettings::default().retry_backoff_ms
}

fn default_connect_timeout_ms() -> u64 {
    KafkaSettings::default().connect_timeout_ms
}

fn default_delivery_timeout_ms() -> u64 {
    KafkaSettings::default().delivery_timeout_ms
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::default(),
            brokers: default_brokers(),
            publish_retries: default_publish_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            publish_timeout_ms: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `EVENTGATE_HOST` overrides `server.host`
/// - `PORT` or `EVENTGATE_PORT` overrides `server.port` (the latter wins)
/// - `KAFKA_BROKERS` overrides `broker.brokers` (comma-separated)
/// - `EVENTGATE_BROKER_BACKEND` overrides `broker.backend`
/// - `EVENTGATE_PUBLISH_TIMEOUT_MS` overrides `broker.publish_timeout_ms`
/// - `EVENTGATE_LOG_LEVEL` overrides `logging.level`
/// - `EVENTGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies the overrides listed on [`load_config`], reading variables
/// through `lookup`. Unparseable values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("EVENTGATE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    for key in ["PORT", "EVENTGATE_PORT"] {
        if let Some(port) = lookup(key) {
            if let Ok(parsed) = port.parse() {
                config.server.port = parsed;
            }
        }
    }
    if let Some(brokers) = lookup("KAFKA_BROKERS") {
        let parsed: Vec<String> = brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();
        if !parsed.is_empty() {
            config.broker.brokers = parsed;
        }
    }
    if let Some(backend) = lookup("EVENTGATE_BROKER_BACKEND") {
        match backend.parse::<BrokerBackend>() {
            Ok(parsed) => config.broker.backend = parsed,
            Err(e) => tracing::warn!("ignoring EVENTGATE_BROKER_BACKEND: {}", e),
        }
    }
    if let Some(timeout) = lookup("EVENTGATE_PUBLISH_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.broker.publish_timeout_ms = Some(parsed);
        }
    }
    if let Some(level) = lookup("EVENTGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("EVENTGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
