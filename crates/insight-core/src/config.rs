//! Configuration management for Insight services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`INSIGHT__<SECTION>__<KEY>`)
//! 2. Config file (`insight.toml`, or any format the `config` crate detects)
//! 3. Defaults
//!
//! Each crate owns the struct for its own section (`[profile]`, `[roles]`,
//! `[build]`, `[neo4j]`); this module only knows how to fetch a section.

use serde::de::DeserializeOwned;

use crate::error::InsightError;

/// Environment prefix for every Insight setting.
pub const ENV_PREFIX: &str = "INSIGHT";

/// Default config file prefix (`insight.toml`, `insight.yaml`, ...).
pub const DEFAULT_FILE_PREFIX: &str = "insight";

/// Build the layered configuration: optional file first, environment on top.
pub fn load(file_prefix: &str) -> Result<config::Config, InsightError> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| InsightError::Config(e.to_string()))
}

/// Deserialize one section of the configuration.
///
/// A missing section yields `T::default()`; a present but malformed section
/// is an error rather than a silent fallback.
pub fn section<T>(cfg: &config::Config, name: &str) -> Result<T, InsightError>
where
    T: DeserializeOwned + Default,
{
    match cfg.get::<T>(name) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section = name, "Config section absent, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(InsightError::Config(format!("[{name}]: {e}"))),
    }
}

/// Convenience wrapper: load the layered configuration and fetch one section.
pub fn load_section<T>(file_prefix: &str, name: &str) -> Result<T, InsightError>
where
    T: DeserializeOwned + Default,
{
    let cfg = load(file_prefix)?;
    section(&cfg, name)
}
