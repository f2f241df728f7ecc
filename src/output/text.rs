//! Plain text output for terminals and log files.

use crate::discovery::DiscoveredDevice;
use crate::measurement::Reading;
use crate::output::OutputFormatter;
use std::fmt::Write;

/// One line per reading, e.g.
/// `Living Room (30:AE:A4:00:00:01): Temperature 23.5 °C, Humidity 41.2 %`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format_reading(&self, reading: &Reading, name: &str) -> String {
        let mut line = format!("{name} ({}):", reading.mac);
        for (i, (kind, value)) in reading.values.iter().enumerate() {
            let separator = if i == 0 { " " } else { ", " };
            // Values carry one decimal digit of precision.
            let _ = write!(line, "{separator}{} {value:.1} {}", kind.label(), kind.unit());
        }
        line
    }

    fn format_device(&self, device: &DiscoveredDevice) -> String {
        match &device.name {
            Some(name) => format!("{} {name}", device.mac),
            None => format!("{} (unnamed)", device.mac),
        }
    }
}
