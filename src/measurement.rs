//! Measurement kinds and decoded sensor readings.

use crate::mac_address::MacAddress;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Physical quantity a beacon can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    Temperature,
    Humidity,
    /// Not broadcast by current firmware; reserved for sensors that add it.
    Pressure,
}

impl MeasurementKind {
    /// Machine name, used in entity ids.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
        }
    }

    /// Human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
        }
    }

    /// Unit of measurement.
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Pressure => "hPa",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown measurement kind '{0}'")]
pub struct UnknownMeasurementKind(pub String);

impl FromStr for MeasurementKind {
    type Err = UnknownMeasurementKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "pressure" => Ok(Self::Pressure),
            other => Err(UnknownMeasurementKind(other.to_string())),
        }
    }
}

/// A reading decoded from one sensor advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub mac: MacAddress,
    /// Unix time in whole seconds at which the reading was accepted
    pub timestamp: i64,
    /// Field flags sent by the firmware (0x01 temperature, 0x02 humidity); not interpreted yet.
    pub flags: u8,
    /// Values in the order they were decoded.
    pub values: Vec<(MeasurementKind, f64)>,
}

#[cfg(test)]
impl Reading {
    pub fn value(&self, kind: MeasurementKind) -> Option<f64> {
        self.values
            .iter()
            .find_map(|&(k, v)| (k == kind).then_some(v))
    }

    pub fn temperature(&self) -> Option<f64> {
        self.value(MeasurementKind::Temperature)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.value(MeasurementKind::Humidity)
    }
}
