//! Configuration loading traits and types.
//!
//! This module loads the detector configuration (`growth_config.toml`)
//! once at process start and exposes the validated, immutable
//! [`GrowthConfig`]: detector identity, HV defaults/limits/conversion,
//! temperature limits and autorun settings.
//!
//! # Usage
//!
//! ```rust,no_run
//! use growth_common::config::{ConfigError, GrowthConfig};
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = GrowthConfig::load_default(None)?;
//!     println!("Detector: {}", config.detector_id());
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! detector_id = "growth-fy2016a"
//!
//! [hv.default]
//! 0 = 1000
//! 1 = 1200
//!
//! [hv.conversion]
//! 0 = [0.0, 0.3]
//!
//! [limits.temperature]
//! lower = 0.0
//! upper = 45.0
//! source = "temperature-pcb"
//!
//! [limits.hv]
//! 0 = 900.0
//!
//! [autorun]
//! exposure_sec = 1800
//! ```

use crate::consts::{
    CONFIG_FILE_ENV, CONFIG_FILE_NAME, DEFAULT_AUTORUN_PERIOD_SEC, DEFAULT_CONFIG_PATH,
    DEFAULT_DAQ_EXPOSURE_SEC, DEFAULT_HK_CHECK_PERIOD_SEC, DEFAULT_HV_LIMIT_V, HV_CHANNELS,
    HV_DAC_MV_MAX, HV_DAC_MV_MIN, REPOSITORY_ENV,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Error type for configuration loading operations.
///
/// Every variant is a fatal startup fault for the processes that need the
/// configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared across all GROWTH processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── File schema ────────────────────────────────────────────────────

/// Raw `growth_config.toml` contents, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub detector_id: String,
    #[serde(default)]
    pub repository: Option<PathBuf>,
    #[serde(default)]
    pub shared: SharedConfig,
    pub hv: Option<HvSection>,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub autorun: AutorunSettings,
}

/// `[hv]` section. Channel keys are decimal strings ("0", "1").
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HvSection {
    /// Default DAC output in mV used when autorun turns HV on.
    pub default: Option<BTreeMap<String, f64>>,
    /// Polynomial coefficients `[c0, c1, ...]` mapping DAC mV to HV volts.
    pub conversion: Option<BTreeMap<String, Vec<f64>>>,
}

/// `[limits]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    pub temperature: Option<TemperatureLimits>,
    /// HV limit in volts per channel.
    pub hv: Option<BTreeMap<String, f64>>,
}

/// Sensor whose temperature gates autorun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemperatureSource {
    /// Slow ADC PCB temperature channels (next to the DC/DC converter).
    #[default]
    TemperaturePcb,
    /// BME280 environmental sensor.
    Bme280,
}

/// `[limits.temperature]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemperatureLimits {
    #[serde(default = "default_lower_temperature")]
    pub lower: f64,
    #[serde(default = "default_upper_temperature")]
    pub upper: f64,
    #[serde(default)]
    pub source: TemperatureSource,
    /// Slow ADC channels checked when `source = "temperature-pcb"`.
    #[serde(default = "default_temperature_channels")]
    pub channels: Vec<u8>,
}

fn default_lower_temperature() -> f64 {
    0.0
}

fn default_upper_temperature() -> f64 {
    60.0
}

fn default_temperature_channels() -> Vec<u8> {
    vec![0, 1]
}

impl TemperatureLimits {
    /// Inclusive range check.
    pub fn contains(&self, temperature_degc: f64) -> bool {
        self.lower <= temperature_degc && temperature_degc <= self.upper
    }
}

/// `[autorun]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutorunSettings {
    /// Exposure of one DAQ output file before switching.
    pub exposure_sec: u64,
    /// Autorun loop period.
    pub period_sec: u64,
    /// Minimum time between HK permission checks.
    pub hk_check_period_sec: u64,
}

impl Default for AutorunSettings {
    fn default() -> Self {
        Self {
            exposure_sec: DEFAULT_DAQ_EXPOSURE_SEC,
            period_sec: DEFAULT_AUTORUN_PERIOD_SEC,
            hk_check_period_sec: DEFAULT_HK_CHECK_PERIOD_SEC,
        }
    }
}

impl AutorunSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_sec)
    }

    pub fn hk_check_period(&self) -> Duration {
        Duration::from_secs(self.hk_check_period_sec)
    }
}

// ─── Validated configuration ────────────────────────────────────────

/// Validated detector configuration. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct GrowthConfig {
    detector_id: String,
    repository: Option<PathBuf>,
    shared: SharedConfig,
    hv_default_mv: BTreeMap<u8, f64>,
    hv_conversion: Option<BTreeMap<u8, Vec<f64>>>,
    hv_limits_v: Option<BTreeMap<u8, f64>>,
    temperature: Option<TemperatureLimits>,
    autorun: AutorunSettings,
}

impl GrowthConfig {
    /// Validate a parsed configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `detector_id` is empty
    /// - the `[hv]` section is absent
    /// - a channel key is not an HV channel index
    /// - a default DAC value is outside the DAC range
    /// - temperature `lower > upper`
    /// - an autorun period is zero
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let detector_id = file.detector_id.trim().to_string();
        if detector_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "detector_id cannot be empty".to_string(),
            ));
        }

        let hv = file
            .hv
            .ok_or_else(|| ConfigError::ValidationError("no [hv] section".to_string()))?;

        let hv_default_mv = match hv.default {
            Some(map) => channel_map(map, "hv.default")?,
            None => {
                warn!("No HV default value defined");
                BTreeMap::new()
            }
        };
        for (ch, mv) in &hv_default_mv {
            if !(HV_DAC_MV_MIN..=HV_DAC_MV_MAX).contains(mv) {
                return Err(ConfigError::ValidationError(format!(
                    "hv.default for channel {ch} ({mv} mV) outside DAC range"
                )));
            }
        }

        let hv_conversion = hv
            .conversion
            .map(|map| channel_map(map, "hv.conversion"))
            .transpose()?;
        if hv_conversion.is_none() {
            warn!("No HV conversion equation defined");
        }

        let hv_limits_v = file
            .limits
            .hv
            .map(|map| channel_map(map, "limits.hv"))
            .transpose()?;

        if let Some(t) = &file.limits.temperature {
            if t.lower > t.upper {
                return Err(ConfigError::ValidationError(format!(
                    "temperature lower limit {} exceeds upper limit {}",
                    t.lower, t.upper
                )));
            }
        } else {
            warn!("Temperature limit not defined");
        }

        if file.autorun.period_sec == 0 || file.autorun.hk_check_period_sec == 0 {
            return Err(ConfigError::ValidationError(
                "autorun periods must be positive".to_string(),
            ));
        }

        let repository = std::env::var_os(REPOSITORY_ENV)
            .map(PathBuf::from)
            .or(file.repository);

        Ok(Self {
            detector_id,
            repository,
            shared: file.shared,
            hv_default_mv,
            hv_conversion,
            hv_limits_v,
            temperature: file.limits.temperature,
            autorun: file.autorun,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_file(file)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {:?}", path);
        let config = Self::from_file(ConfigFile::load(path)?)?;
        info!("detector_id: {}", config.detector_id);
        Ok(config)
    }

    /// Load from an explicit path, or from the first file found in the
    /// search order `$GROWTH_CONFIG_FILE`, `~/growth_config.toml`,
    /// `/etc/growth/growth_config.toml`.
    pub fn load_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load(&discover_config_file().ok_or(ConfigError::FileNotFound)?),
        }
    }

    pub fn detector_id(&self) -> &str {
        &self.detector_id
    }

    /// Detector software repository (used for `det.hash`).
    pub fn repository(&self) -> Option<&Path> {
        self.repository.as_deref()
    }

    pub fn shared(&self) -> &SharedConfig {
        &self.shared
    }

    /// Default DAC output for a channel, if configured.
    pub fn hv_default_mv(&self, channel: u8) -> Option<f64> {
        self.hv_default_mv.get(&channel).copied()
    }

    /// HV limit in volts for a channel.
    pub fn hv_limit_v(&self, channel: u8) -> f64 {
        self.hv_limits_v
            .as_ref()
            .and_then(|limits| limits.get(&channel).copied())
            .unwrap_or(DEFAULT_HV_LIMIT_V)
    }

    /// True when `hv.set` must check the converted HV against the limit.
    pub fn hv_limit_enforced(&self) -> bool {
        self.hv_limits_v.is_some() && self.hv_conversion.is_some()
    }

    /// Convert a DAC output (mV) into HV volts. `None` if the channel has no
    /// conversion polynomial.
    pub fn to_hv_voltage(&self, channel: u8, dac_mv: f64) -> Option<f64> {
        let coefficients = self.hv_conversion.as_ref()?.get(&channel)?;
        Some(
            coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * dac_mv + c),
        )
    }

    pub fn temperature_limits(&self) -> Option<&TemperatureLimits> {
        self.temperature.as_ref()
    }

    /// True when `temperature_degc` lies within the configured limits.
    /// Always false when no temperature limits are configured.
    pub fn inside_temperature_limit(&self, temperature_degc: f64) -> bool {
        self.temperature
            .as_ref()
            .is_some_and(|limits| limits.contains(temperature_degc))
    }

    pub fn autorun(&self) -> &AutorunSettings {
        &self.autorun
    }
}

/// Search order for the configuration file.
pub fn discover_config_file() -> Option<PathBuf> {
    let from_env = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
    let from_home = dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME));
    let system = Some(PathBuf::from(DEFAULT_CONFIG_PATH));

    [from_env, from_home, system]
        .into_iter()
        .flatten()
        .find(|path| path.is_file())
}

/// Convert `"0" = v` keys into HV channel indices.
fn channel_map<V>(map: BTreeMap<String, V>, section: &str) -> Result<BTreeMap<u8, V>, ConfigError> {
    map.into_iter()
        .map(|(key, value)| {
            key.trim()
                .parse::<u8>()
                .ok()
                .filter(|ch| HV_CHANNELS.contains(ch))
                .map(|ch| (ch, value))
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!("{section}: invalid channel '{key}'"))
                })
        })
        .collect()
}
