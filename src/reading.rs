//! Readings from configured sensors.
//!
//! The matcher looks up the advertising MAC in the sensor configuration,
//! applies the sensor's duplicate-suppression window and decodes the
//! manufacturer data into physical values.
//!
//! Sensor manufacturer data layout, all little-endian:
//!
//! | offset | size | field                         |
//! |--------|------|-------------------------------|
//! | 0      | 2    | vendor identifier (`FF FF`)   |
//! | 2      | 1    | flags                         |
//! | 3      | 2    | temperature, 0.1 °C per unit  |
//! | 5      | 2    | humidity, 0.1 % per unit      |

use crate::advertisement::Advertisement;
use crate::config::{SensorConfig, SensorMap};
use crate::mac_address::MacAddress;
use crate::measurement::{MeasurementKind, Reading};
use crate::vendor::{self, VENDOR_ID};
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

/// Errors for advertisements of configured sensors that cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    #[error("expected manufacturer data to be present (advertisement from {mac})")]
    MissingManufacturerData { mac: MacAddress },
    #[error("manufacturer data from {mac} holds {len} bytes after the vendor id, expected at least 5")]
    MalformedPayload { mac: MacAddress, len: usize },
}

/// Source of the current time in whole seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}

/// Turns advertisements of configured sensors into readings.
///
/// Last-accepted times live in the matcher, seeded once from the
/// configuration; the configuration itself is never modified.
#[derive(Debug)]
pub struct ReadingMatcher<C = SystemClock> {
    sensors: SensorMap,
    last_reading: HashMap<MacAddress, i64>,
    clock: C,
}

impl ReadingMatcher<SystemClock> {
    pub fn new(sensors: SensorMap) -> Self {
        Self::with_clock(sensors, SystemClock)
    }
}

impl<C: Clock> ReadingMatcher<C> {
    pub fn with_clock(sensors: SensorMap, clock: C) -> Self {
        let last_reading = sensors
            .iter()
            .filter_map(|(mac, sensor)| sensor.last_reading_timestamp.map(|t| (*mac, t)))
            .collect();

        Self {
            sensors,
            last_reading,
            clock,
        }
    }

    pub fn sensor(&self, mac: &MacAddress) -> Option<&SensorConfig> {
        self.sensors.get(mac)
    }

    /// Unix time of the last accepted advertisement of `mac`.
    #[cfg(test)]
    pub fn last_reading(&self, mac: &MacAddress) -> Option<i64> {
        self.last_reading.get(mac).copied()
    }

    /// Inspect one advertisement.
    ///
    /// Returns `Ok(None)` for unconfigured devices and for advertisements that
    /// fall inside the sensor's duplicate window. An accepted advertisement
    /// restarts the window even if its payload then fails to decode.
    pub fn on_advertisement(&mut self, ad: &Advertisement) -> Result<Option<Reading>, ReadingError> {
        let Some(sensor) = self.sensors.get(&ad.mac) else {
            return Ok(None);
        };

        let now = self.clock.now();
        let window = i64::try_from(sensor.duplicate_time).unwrap_or(i64::MAX);
        if self
            .last_reading
            .get(&ad.mac)
            .is_some_and(|&last| last > now.saturating_sub(window))
        {
            tracing::trace!(mac = %ad.mac, "suppressing duplicate reading");
            return Ok(None);
        }
        self.last_reading.insert(ad.mac, now);

        let data = vendor::manufacturer_data(&ad.elements)
            .ok_or(ReadingError::MissingManufacturerData { mac: ad.mac })?;

        decode_sensor_data(ad.mac, data, now).map(Some)
    }
}

/// Decode the manufacturer data of a sensor beacon, vendor identifier included.
///
/// Bytes past the humidity field are ignored.
pub fn decode_sensor_data(mac: MacAddress, data: &[u8], timestamp: i64) -> Result<Reading, ReadingError> {
    let fields = data.get(VENDOR_ID.len()..).unwrap_or_default();
    let &[flags, t0, t1, h0, h1, ..] = fields else {
        return Err(ReadingError::MalformedPayload {
            mac,
            len: fields.len(),
        });
    };

    let raw_temperature = u16::from_le_bytes([t0, t1]);
    let raw_humidity = u16::from_le_bytes([h0, h1]);

    Ok(Reading {
        mac,
        timestamp,
        flags,
        values: vec![
            (MeasurementKind::Temperature, f64::from(raw_temperature) / 10.0),
            (MeasurementKind::Humidity, f64::from(raw_humidity) / 10.0),
        ],
    })
}
