//! # Mount Configuration
//!
//! Serial link, motion and monitor settings, loaded from a TOML file.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 9600
//! timeout_ms = 2000
//!
//! [motion]
//! default_rate = 5
//! step_pulse_ms = 250
//!
//! [monitor]
//! poll_interval_ms = 500
//!
//! [site]
//! latitude = 52.37
//! longitude = 4.89
//! ```
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use nexstar_rs::config::Config;
//! let toml_str = r#"
//! [serial]
//! port = "/dev/ttyUSB1"
//!
//! [monitor]
//! poll_interval_ms = 250
//! "#;
//! let config: Config = toml::from_str(toml_str).unwrap();
//! assert_eq!(config.serial.baud, 9600);
//! assert_eq!(config.monitor.poll_interval_ms, 250);
//! assert!(config.validate().is_ok());
//! ```

// src/config.rs - Single configuration file
use crate::coordinates::GeographicLocation;
use crate::motion::Rate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the serial link, motion defaults, position monitor and site.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub motion: MotionSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub site: Option<SiteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionSettings {
    /// Rate used by `start` when the caller does not name one. Clamped to 0..=9.
    #[serde(default = "default_rate")]
    pub default_rate: u8,
    /// How long a single step keeps the axis moving before it is stopped again.
    #[serde(default = "default_step_pulse_ms")]
    pub step_pulse_ms: u64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            default_rate: default_rate(),
            step_pulse_ms: default_step_pulse_ms(),
        }
    }
}

impl MotionSettings {
    pub fn rate(&self) -> Rate {
        Rate::new(self.default_rate)
    }

    pub fn step_pulse(&self) -> Duration {
        Duration::from_millis(self.step_pulse_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls tolerated before the monitor gives up.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl MonitorSettings {
    /// Never zero; a zero setting polls every millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub latitude: f64,
    pub longitude: f64,
}

impl SiteConfig {
    pub fn location(&self) -> Result<GeographicLocation, ConfigError> {
        GeographicLocation::new(self.latitude, self.longitude)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("Serial port must not be empty".to_string()));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("Baud rate must be > 0".to_string()));
        }
        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::Invalid("Serial timeout must be > 0".to_string()));
        }
        if self.motion.default_rate > Rate::MAX.value() {
            return Err(ConfigError::Invalid(format!(
                "Default rate {} is outside 0..=9",
                self.motion.default_rate
            )));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("Monitor poll interval must be > 0".to_string()));
        }
        if let Some(site) = &self.site {
            site.location()?;
        }
        Ok(())
    }
}

fn default_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud() -> u32 { 9600 }
fn default_timeout_ms() -> u64 { 2000 }
fn default_rate() -> u8 { 5 }
fn default_step_pulse_ms() -> u64 { 250 }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_max_consecutive_failures() -> u32 { 3 }

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.timeout(), Duration::from_secs(2));
        assert_eq!(config.motion.rate().value(), 5);
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(500));
        assert!(config.site.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[serial]\nport = \"/dev/ttyACM3\"\ntimeout_ms = 1500\n\n[site]\nlatitude = -33.9\nlongitude = 18.4"
        )
        .unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM3");
        assert_eq!(config.serial.timeout_ms, 1500);
        let site = config.site.unwrap().location().unwrap();
        assert_eq!(site.latitude(), -33.9);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.motion.default_rate = 12;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.site = Some(SiteConfig { latitude: 91.0, longitude: 0.0 });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("/nonexistent/mount.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
