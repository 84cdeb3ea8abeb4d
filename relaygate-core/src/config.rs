use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub endpoints: EndpointsConfig,
    pub webrtc: WebRTCConfig,
    pub logging: LoggingConfig,
}

/// Control listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Fixed port clients contact for endpoint discovery
    pub control_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            control_port: 9999,
        }
    }
}

/// Per-endpoint listener and scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Host every endpoint listener binds to
    pub host: String,
    /// Port (and identifier) of the first endpoint; later ones count up from here
    pub first_port: u16,
    /// Load in bits/sec above which an endpoint no longer receives new sessions
    pub admission_threshold_bps: f64,
    /// Background load sampling period in seconds (0 = disabled)
    pub sample_interval_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            first_port: 16666,
            admission_threshold_bps: 1e5,
            sample_interval_secs: 5,
        }
    }
}

/// Media engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRTCConfig {
    /// STUN/TURN URLs handed to every peer connection
    pub ice_servers: Vec<String>,
    /// Upper bound on waiting for ICE gathering before answering an offer
    pub ice_gathering_timeout_secs: u64,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            ice_gathering_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // RELAYGATE_SERVER__CONTROL_PORT, RELAYGATE_ENDPOINTS__FIRST_PORT, ...
        builder = builder.add_source(
            Environment::with_prefix("RELAYGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check cross-field constraints, returning every violation found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.control_port == 0 {
            errors.push("server.control_port must be non-zero".to_string());
        }
        if self.endpoints.first_port == 0 {
            errors.push("endpoints.first_port must be non-zero".to_string());
        }
        if self.server.host == self.endpoints.host
            && self.server.control_port >= self.endpoints.first_port
        {
            errors.push(format!(
                "endpoints.first_port ({}) must be above server.control_port ({}) on a shared host",
                self.endpoints.first_port, self.server.control_port
            ));
        }
        if !self.endpoints.admission_threshold_bps.is_finite()
            || self.endpoints.admission_threshold_bps < 0.0
        {
            errors.push("endpoints.admission_threshold_bps must be a non-negative number".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get control listener address
    #[must_use]
    pub fn control_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.control_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.control_port, 9999);
        assert_eq!(config.endpoints.first_port, 16666);
        assert!((config.endpoints.admission_threshold_bps - 1e5).abs() < f64::EPSILON);
        assert!(!config.webrtc.ice_servers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_control_address() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                control_port: 8000,
            },
            ..Default::default()
        };

        assert_eq!(config.control_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.server.control_port = 20000;
        config.endpoints.admission_threshold_bps = f64::NAN;
        config.logging.format = "xml".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "endpoints:\n  first_port: 20000\n  admission_threshold_bps: 250000.0\nlogging:\n  format: json"
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.endpoints.first_port, 20000);
        assert!((config.endpoints.admission_threshold_bps - 250_000.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.format, "json");
        // untouched sections keep their defaults
        assert_eq!(config.server.control_port, 9999);
    }
}
