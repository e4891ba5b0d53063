//! Service configuration
//!
//! Configuration is read from a TOML file and then layered with `TRACKER_*`
//! environment overrides before validation. Override resolution takes a
//! lookup function so it can be exercised without touching the process
//! environment.

use crate::routing::schema::DEFAULT_SCHEMA_DIR;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variables consulted by [`ServiceConfig::apply_env_overrides`]
pub mod env {
    pub const LOG_LEVEL: &str = "TRACKER_LOG_LEVEL";
    pub const HEALTHCHECK_PORT: &str = "TRACKER_HEALTHCHECK_PORT";
    pub const MQTT_HOST: &str = "TRACKER_MQTT_HOST";
    pub const MQTT_PORT: &str = "TRACKER_MQTT_PORT";
    pub const MQTT_INSECURE: &str = "TRACKER_MQTT_INSECURE";
    pub const MQTT_TLS_CA_CERT: &str = "TRACKER_MQTT_TLS_CA_CERT";
    pub const MQTT_TLS_CLIENT_CERT: &str = "TRACKER_MQTT_TLS_CLIENT_CERT";
    pub const MQTT_TLS_CLIENT_KEY: &str = "TRACKER_MQTT_TLS_CLIENT_KEY";
    pub const MQTT_TLS_VERIFY_SERVER: &str = "TRACKER_MQTT_TLS_VERIFY_SERVER";
    pub const MQTT_SCHEMA_VALIDATION: &str = "TRACKER_MQTT_SCHEMA_VALIDATION";
}

/// Log levels accepted by the configuration and the CLI
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Lowest port the healthcheck server may bind
pub const MIN_HEALTHCHECK_PORT: u16 = 1024;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    /// Plain TCP when true, TLS otherwise
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSection>,
}

/// TLS material for the broker connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_path: Option<String>,
    #[serde(default = "default_true")]
    pub verify_server: bool,
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            verify_server: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerSection {
    #[serde(default = "default_true")]
    pub schema_validation: bool,
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,
    #[serde(default)]
    pub healthcheck: HealthcheckSection,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            schema_validation: true,
            schema_dir: default_schema_dir(),
            healthcheck: HealthcheckSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthcheckSection {
    #[serde(default = "default_healthcheck_port")]
    pub port: u16,
}

impl Default for HealthcheckSection {
    fn default() -> Self {
        Self {
            port: default_healthcheck_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// trace|debug|info|warn|error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// json|pretty|compact
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SCHEMA_DIR)
}

fn default_healthcheck_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid {name}: {value} ({reason})")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },
}

impl ServiceConfig {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from_file_with_env(path, |name| std::env::var(name).ok())
    }

    /// Same as [`ServiceConfig::load_from_file`] with an explicit environment
    pub fn load_from_file_with_env<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path)?;
        let mut config: ServiceConfig = toml::from_str(&content)?;

        config.apply_env_overrides(lookup)?;
        config.validate()?;

        Ok(config)
    }

    /// Apply `TRACKER_*` overrides. Empty values count as unset.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(level) = get(env::LOG_LEVEL) {
            self.logging.level = parse_log_level(&level, env::LOG_LEVEL)?;
        }
        if let Some(port) = get(env::HEALTHCHECK_PORT) {
            self.tracker.healthcheck.port =
                parse_port(&port, env::HEALTHCHECK_PORT, MIN_HEALTHCHECK_PORT)?;
        }

        if let Some(host) = get(env::MQTT_HOST) {
            self.mqtt.host = host;
        }
        if let Some(port) = get(env::MQTT_PORT) {
            self.mqtt.port = parse_port(&port, env::MQTT_PORT, 1)?;
        }
        if let Some(insecure) = get(env::MQTT_INSECURE) {
            self.mqtt.insecure = parse_bool(&insecure, env::MQTT_INSECURE)?;
        }
        if let Some(validation) = get(env::MQTT_SCHEMA_VALIDATION) {
            self.tracker.schema_validation = parse_bool(&validation, env::MQTT_SCHEMA_VALIDATION)?;
        }

        let ca_cert = get(env::MQTT_TLS_CA_CERT);
        let client_cert = get(env::MQTT_TLS_CLIENT_CERT);
        let client_key = get(env::MQTT_TLS_CLIENT_KEY);
        let verify_server = get(env::MQTT_TLS_VERIFY_SERVER)
            .map(|value| parse_bool(&value, env::MQTT_TLS_VERIFY_SERVER))
            .transpose()?;

        if ca_cert.is_some() || client_cert.is_some() || client_key.is_some() || verify_server.is_some()
        {
            let tls = self.mqtt.tls.get_or_insert_with(TlsSection::default);
            if ca_cert.is_some() {
                tls.ca_cert_path = ca_cert;
            }
            if client_cert.is_some() {
                tls.client_cert_path = client_cert;
            }
            if client_key.is_some() {
                tls.client_key_path = client_key;
            }
            if let Some(verify) = verify_server {
                tls.verify_server = verify;
            }
        }

        Ok(())
    }

    /// Check value ranges that the TOML types alone cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.host must not be empty".to_string(),
            ));
        }
        if self.mqtt.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.port must be in range 1-65535".to_string(),
            ));
        }
        if self.tracker.healthcheck.port < MIN_HEALTHCHECK_PORT {
            return Err(ConfigError::InvalidConfig(format!(
                "tracker.healthcheck.port {} must be in range {MIN_HEALTHCHECK_PORT}-65535",
                self.tracker.healthcheck.port
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "logging.level '{}' must be one of {}",
                self.logging.level,
                LOG_LEVELS.join("|")
            )));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
host = "localhost"
port = 1883
insecure = true
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn invalid_env(name: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Accepts true/1/yes and false/0/no
pub fn parse_bool(value: &str, source: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid_env(
            source,
            value,
            "must be true/false, 1/0, or yes/no",
        )),
    }
}

/// Parse a port in `min..=65535`
pub fn parse_port(value: &str, source: &str, min: u16) -> Result<u16, ConfigError> {
    let port: u32 = value
        .trim()
        .parse()
        .map_err(|_| invalid_env(source, value, "not a number"))?;

    if port < u32::from(min) || port > u32::from(u16::MAX) {
        return Err(invalid_env(
            source,
            value,
            format!("must be {min}-65535"),
        ));
    }
    Ok(port as u16)
}

fn parse_log_level(value: &str, source: &str) -> Result<String, ConfigError> {
    let level = value.to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(invalid_env(
            source,
            value,
            format!("must be one of {}", LOG_LEVELS.join("|")),
        ))
    }
}
