//! Output formatters for readings and discovered devices.

pub mod text;

use crate::discovery::DiscoveredDevice;
use crate::measurement::Reading;

/// Converts scan results into printable lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a reading of the sensor called `name`.
    fn format_reading(&self, reading: &Reading, name: &str) -> String;

    /// Format a newly discovered device.
    fn format_device(&self, device: &DiscoveredDevice) -> String;
}
