//! `btle-sensor-scanner` library.
//!
//! Listens for BTLE advertisements of NN temperature/humidity sensors,
//! discovers compatible devices, and prints or uploads readings of the
//! sensors listed in a configuration file.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The core “business logic” lives in [`crate::app`] where it can be tested
//! deterministically with an injected advertisement source, HTTP transport
//! and output stream.

pub mod advertisement;
pub mod app;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod mac_address;
pub mod measurement;
pub mod output;
pub mod reading;
pub mod scanner;
pub mod upload;
pub mod vendor;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{AdElement, Advertisement, RawAdvertisement};
pub use config::{ConfigError, SensorConfig, SensorMap};
pub use discovery::{DiscoveredDevice, Discovery};
pub use mac_address::MacAddress;
pub use measurement::{MeasurementKind, Reading};
pub use output::OutputFormatter;
pub use output::text::TextFormatter;
pub use reading::{ReadingError, ReadingMatcher};
pub use scanner::{Backend, ScanError};
pub use upload::{Transport, UploadError, Uploader};
