//! # Configuration Module
//!
//! Handles loading, validating and persisting configuration from TOML files.
//!
//! The configuration is built once at startup and handed to each
//! component. Every option has a documented default except the collector
//! credentials; a missing file is created with the defaults.

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::admission::SpeedLimits;
use crate::error::{LoggerError, Result};
use crate::logbuf::FlushPolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// How [`Config::load_or_init`] obtained the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// No file existed; the defaults were written
    Created,
    /// Defaulted options were added to the existing file
    Completed,
    /// The file was complete and left untouched
    Loaded,
}

impl ConfigOrigin {
    /// Log the outcome for `path`
    pub fn log(self, path: &Path) {
        match self {
            Self::Created => warn!("No configuration file found at {}, default values written", path.display()),
            Self::Completed => info!("Persisted default values into {}", path.display()),
            Self::Loaded => debug!("Loaded configuration file {}", path.display()),
        }
    }
}

/// Sampling and storage configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GeneralConfig {
    #[serde(default = "default_app_dir")]
    pub app_dir: PathBuf,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    #[serde(default = "default_processed_logs_dir")]
    pub processed_logs_dir: PathBuf,

    #[serde(default = "default_scan_interval_s")]
    pub scan_interval_s: u64,

    #[serde(default = "default_min_speed_kmh")]
    pub min_speed_kmh: f64,

    #[serde(default = "default_max_speed_kmh")]
    pub max_speed_kmh: f64,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    /// 0 disables the byte budget; files are then cut by record count
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: usize,
}

/// Collector configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UploadConfig {
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    #[serde(default = "default_api_check_url")]
    pub api_check_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    pub login: String,

    pub password: String,
}

/// Software identity written into log headers
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_software_id")]
    pub software_id: String,

    #[serde(default = "default_software_version")]
    pub software_version: String,
}

/// Configuration file used when none is given on the command line
pub const CONFIG_FILE_NAME: &str = "cell-logger.toml";

/// `~/.cell-logger/cell-logger.toml`, under the temp dir when there is no home
pub fn default_config_path() -> PathBuf {
    default_app_dir().join(CONFIG_FILE_NAME)
}

// Default value functions
fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cell-logger")
}
fn default_logs_dir() -> PathBuf { default_app_dir().join("Logs") }
fn default_processed_logs_dir() -> PathBuf { default_app_dir().join("Processed_logs") }
fn default_scan_interval_s() -> u64 { 10 }
fn default_min_speed_kmh() -> f64 { 0.0 }
fn default_max_speed_kmh() -> f64 { 150.0 }
fn default_max_records_per_file() -> usize { 3 }
fn default_max_file_size_bytes() -> usize { 20480 }

fn default_upload_url() -> String { "http://realtimeblog.free.fr/upload/upl.php5".to_string() }
fn default_api_check_url() -> String { "http://realtimeblog.free.fr/getInterfacesVersion.php".to_string() }
fn default_api_version() -> String { "2".to_string() }
fn default_login() -> String { "your_login".to_string() }
fn default_password() -> String { "your_password".to_string() }

fn default_software_id() -> String { env!("CARGO_PKG_NAME").to_string() }
fn default_software_version() -> String { env!("CARGO_PKG_VERSION").to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_dir: default_app_dir(),
            logs_dir: default_logs_dir(),
            processed_logs_dir: default_processed_logs_dir(),
            scan_interval_s: default_scan_interval_s(),
            min_speed_kmh: default_min_speed_kmh(),
            max_speed_kmh: default_max_speed_kmh(),
            max_records_per_file: default_max_records_per_file(),
            max_file_size_bytes: default_max_file_size_bytes(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            api_check_url: default_api_check_url(),
            api_version: default_api_version(),
            login: default_login(),
            password: default_password(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            software_id: default_software_id(),
            software_version: default_software_version(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            upload: UploadConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails (including a missing option with no default)
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cell_logger::config::Config;
    ///
    /// let config = Config::load("cell-logger.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration, persisting defaults where they were used.
    ///
    /// - No file: the default configuration is written and returned.
    /// - File with some defaulted options missing: the completed
    ///   configuration is written back.
    /// - Missing option without a default: [`LoggerError::ConfigurationMissing`].
    ///
    /// Runs before logging is set up, so it reports what it did through
    /// [`ConfigOrigin`] instead of logging.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigOrigin)> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok((config, ConfigOrigin::Created));
        }

        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        config.validate()?;

        let on_disk = toml::Value::Table(toml::from_str(&contents)?);
        let complete = toml::Value::try_from(&config)?;
        if on_disk != complete {
            config.save(path)?;
            return Ok((config, ConfigOrigin::Completed));
        }
        Ok((config, ConfigOrigin::Loaded))
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        info!("Saved config file {}", path.display());
        Ok(())
    }

    fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| {
            let message = e.message();
            match message.strip_prefix("missing field ") {
                Some(field) => LoggerError::ConfigurationMissing(field.trim_matches('`').to_string()),
                None => LoggerError::Config(e),
            }
        })
    }

    /// Admission speed window
    pub fn speed_limits(&self) -> SpeedLimits {
        SpeedLimits {
            min_kmh: self.general.min_speed_kmh,
            max_kmh: self.general.max_speed_kmh,
        }
    }

    /// File cutting policy
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::from_limits(self.general.max_file_size_bytes, self.general.max_records_per_file)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.general.logs_dir.as_os_str().is_empty()
            || self.general.processed_logs_dir.as_os_str().is_empty()
        {
            return Err(LoggerError::Config(
                toml::de::Error::custom("logs_dir and processed_logs_dir cannot be empty")
            ));
        }

        if self.general.logs_dir == self.general.processed_logs_dir {
            return Err(LoggerError::Config(
                toml::de::Error::custom("logs_dir and processed_logs_dir must differ")
            ));
        }

        if self.general.scan_interval_s == 0 || self.general.scan_interval_s > 3600 {
            return Err(LoggerError::Config(
                toml::de::Error::custom("scan_interval_s must be between 1 and 3600")
            ));
        }

        if !self.general.min_speed_kmh.is_finite()
            || !self.general.max_speed_kmh.is_finite()
            || self.general.min_speed_kmh < 0.0
        {
            return Err(LoggerError::Config(
                toml::de::Error::custom("speed limits must be finite and non-negative")
            ));
        }

        if self.general.min_speed_kmh > self.general.max_speed_kmh {
            return Err(LoggerError::Config(
                toml::de::Error::custom("min_speed_kmh must not exceed max_speed_kmh")
            ));
        }

        if self.general.max_records_per_file == 0 {
            return Err(LoggerError::Config(
                toml::de::Error::custom("max_records_per_file must be greater than 0")
            ));
        }

        for (name, value) in [
            ("upload_url", &self.upload.upload_url),
            ("api_check_url", &self.upload.api_check_url),
            ("api_version", &self.upload.api_version),
        ] {
            if value.trim().is_empty() {
                return Err(LoggerError::Config(
                    toml::de::Error::custom(format!("{} cannot be empty", name))
                ));
            }
        }

        Ok(())
    }
}
