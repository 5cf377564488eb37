//! System-wide constants for the GROWTH workspace.
//!
//! Single source of truth for ports, ranges and default periods.
//! Imported by all crates; values are not duplicated elsewhere.

use std::time::Duration;

/// TCP port of the detector command dispatch server.
pub const DETECTOR_CONTROLLER_PORT: u16 = 10000;

/// TCP port of the display server.
pub const DISPLAY_SERVER_PORT: u16 = 10010;

/// TCP port of the DAQ program's command server.
pub const DAQ_SERVER_PORT: u16 = 10020;

/// Send/receive timeout used by every client connection.
pub const CLIENT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Largest accepted frame payload (1 MiB).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Reserved target that addresses the dispatch server itself.
pub const CONTROLLER_TARGET: &str = "controller";

/// HV channel indices.
pub const HV_CHANNELS: [u8; 2] = [0, 1];

/// Lowest accepted HV DAC output in mV.
pub const HV_DAC_MV_MIN: f64 = 0.0;

/// Highest accepted HV DAC output in mV.
pub const HV_DAC_MV_MAX: f64 = 3300.0;

/// HV limit in volts applied to channels without an explicit limit.
pub const DEFAULT_HV_LIMIT_V: f64 = 700.0;

/// Default heartbeat increment interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SEC: u64 = 10;

/// Longest accepted heartbeat increment interval in seconds.
pub const MAX_HEARTBEAT_INTERVAL_SEC: u64 = 1800;

/// Number of distinct heartbeat values (2-bit counter).
pub const HEARTBEAT_MODULUS: u8 = 4;

/// Number of attempts made to read the BME280 per HK read.
pub const BME280_READ_TRIALS: usize = 5;

/// Default autorun loop period in seconds.
pub const DEFAULT_AUTORUN_PERIOD_SEC: u64 = 15;

/// Default period between autorun HK permission checks in seconds.
pub const DEFAULT_HK_CHECK_PERIOD_SEC: u64 = 30;

/// Default exposure of a single DAQ output file in seconds.
pub const DEFAULT_DAQ_EXPOSURE_SEC: u64 = 1800;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_FILE_ENV: &str = "GROWTH_CONFIG_FILE";

/// Environment variable naming the detector software repository.
pub const REPOSITORY_ENV: &str = "GROWTH_REPOSITORY";

/// Configuration file name looked up in the home directory.
pub const CONFIG_FILE_NAME: &str = "growth_config.toml";

/// System-wide configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/growth/growth_config.toml";
