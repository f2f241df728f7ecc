//! Sensor configuration.
//!
//! The configuration file is TOML with one table per sensor, keyed by the
//! sensor's MAC address:
//!
//! ```toml
//! ["30:AE:A4:00:00:01"]
//! name = "Living Room"
//! home_assistant_url = "http://hass.local:8123"
//! home_assistant_key = "secret"
//! duplicate_time = 60
//! ```

use crate::mac_address::{MacAddress, ParseMacError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration of one sensor beacon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfig {
    /// Display name, e.g. "Living Room"
    pub name: String,
    /// Base URL of the Home Assistant instance
    pub home_assistant_url: String,
    /// Value of the `X-HA-Access` header
    pub home_assistant_key: String,
    /// Minimum number of seconds between two accepted readings
    pub duplicate_time: u64,
    /// Unix time of the last accepted reading, if one is known from a previous run
    #[serde(default)]
    pub last_reading_timestamp: Option<i64>,
}

/// Configured sensors by MAC address.
pub type SensorMap = BTreeMap<MacAddress, SensorConfig>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid sensor key: {0}")]
    InvalidMac(#[from] ParseMacError),
    #[error("sensor {0} is configured more than once")]
    DuplicateSensor(MacAddress),
}

/// Read and parse the configuration file at `path`.
pub fn load(path: &Path) -> Result<SensorMap, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sensors = parse(&content)?;
    tracing::info!(path = %path.display(), sensors = sensors.len(), "loaded sensor configuration");
    Ok(sensors)
}

/// Parse configuration text.
///
/// Keys are parsed as MAC addresses; two keys naming the same address in
/// different letter case are rejected.
pub fn parse(content: &str) -> Result<SensorMap, ConfigError> {
    let raw: BTreeMap<String, SensorConfig> = toml::from_str(content)?;

    let mut sensors = SensorMap::new();
    for (key, sensor) in raw {
        let mac: MacAddress = key.parse()?;
        if sensors.insert(mac, sensor).is_some() {
            return Err(ConfigError::DuplicateSensor(mac));
        }
    }

    Ok(sensors)
}
