//! Autorun startup errors.

use growth_common::config::ConfigError;
use thiserror::Error;

/// Fatal startup faults of the autorun supervisor.
#[derive(Debug, Error)]
pub enum AutorunError {
    /// `[limits.temperature]` is required to decide on unattended runs.
    #[error("Temperature limits should be defined in the configuration ([limits.temperature])")]
    MissingTemperatureLimits,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
