//! Core application runner for `btle-sensor-scanner`.
//!
//! This module is intentionally decoupled from process exit codes and real
//! hardware so it can be tested deterministically with an injected
//! advertisement source, HTTP transport and output stream.

use crate::advertisement::{Advertisement, RawAdvertisement};
use crate::config::{self, ConfigError};
use crate::discovery::Discovery;
use crate::output::OutputFormatter;
use crate::output::text::TextFormatter;
use crate::reading::{Clock, ReadingMatcher};
use crate::scanner::{Backend, ScanError};
use crate::upload::{Transport, Uploader};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Command line options.
#[derive(Parser, Debug, Clone)]
#[command(about, version)]
pub struct Options {
    /// Path to a configuration file (required for printing and upload)
    #[arg(short = 'f', long = "file", value_name = "CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Upload values to configured server, instead of just printing them
    #[arg(short = 'u', long, group = "mode")]
    pub upload: bool,

    /// Discover available devices
    #[arg(short = 'd', long, group = "mode")]
    pub discover: bool,

    /// Print values to STDOUT (default)
    #[arg(short = 'p', long, group = "mode")]
    pub print: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Verbose output, log debug details about ignored advertisements
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// What the scan session does with what it sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Print,
    Upload,
    Discover,
}

impl Options {
    pub fn mode(&self) -> Mode {
        if self.discover {
            Mode::Discover
        } else if self.upload {
            Mode::Upload
        } else {
            Mode::Print
        }
    }

    /// Check option combinations clap cannot express.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.mode() != Mode::Discover && self.config_file.is_none() {
            return Err(RunError::MissingConfigFile);
        }
        Ok(())
    }
}

/// Errors that end a scan session.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Specifying a configuration file is required.")]
    MissingConfigFile,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ScanFuture<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<RawAdvertisement>, ScanError>> + Send + 'a>>;

/// Advertisement source abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait AdvertisementSource: Send + Sync {
    fn start(&self, backend: Backend) -> ScanFuture<'_>;
}

/// Real source that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct BluetoothSource;

impl AdvertisementSource for BluetoothSource {
    fn start(&self, backend: Backend) -> ScanFuture<'_> {
        Box::pin(async move { crate::scanner::start_scan(backend).await })
    }
}

/// Where accepted readings go.
pub enum ReadingSink<'a> {
    Print,
    Upload(Uploader<'a>),
}

/// Report every compatible device once, until the source ends.
pub async fn run_discovery(
    source: &dyn AdvertisementSource,
    backend: Backend,
    formatter: &dyn OutputFormatter,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let mut discovery = Discovery::new();
    let mut advertisements = source.start(backend).await?;

    while let Some(raw) = advertisements.recv().await {
        let Some(ad) = Advertisement::from_raw(&raw) else {
            continue;
        };

        if let Some(device) = discovery.on_advertisement(&ad) {
            tracing::info!(mac = %device.mac, rssi = ad.rssi, "discovered device");
            writeln!(out, "{}", formatter.format_device(&device))?;
        }
    }

    tracing::info!(seen = discovery.known_count(), "discovery finished");
    Ok(())
}

/// Decode readings of configured sensors and print or upload them, until the source ends.
///
/// Undecodable advertisements and failed uploads are logged and the session
/// carries on with the next advertisement.
pub async fn run_readings<C: Clock>(
    matcher: &mut ReadingMatcher<C>,
    sink: &ReadingSink<'_>,
    source: &dyn AdvertisementSource,
    backend: Backend,
    formatter: &dyn OutputFormatter,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let mut advertisements = source.start(backend).await?;

    while let Some(raw) = advertisements.recv().await {
        let Some(ad) = Advertisement::from_raw(&raw) else {
            continue;
        };

        let reading = match matcher.on_advertisement(&ad) {
            Ok(Some(reading)) => reading,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "skipping advertisement");
                continue;
            }
        };
        let Some(sensor) = matcher.sensor(&reading.mac) else {
            continue;
        };

        match sink {
            ReadingSink::Print => {
                writeln!(out, "{}", formatter.format_reading(&reading, &sensor.name))?;
            }
            ReadingSink::Upload(uploader) => match uploader.upload(sensor, &reading).await {
                Ok(()) => tracing::info!(sensor = %sensor.name, "uploaded reading"),
                Err(e) => tracing::warn!(sensor = %sensor.name, error = %e, "upload failed"),
            },
        }
    }

    Ok(())
}

/// Run the session selected by `options`, writing printed output to `out`.
pub async fn run_with_io(
    options: Options,
    source: &dyn AdvertisementSource,
    transport: &dyn Transport,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let formatter = TextFormatter;

    let mode = options.mode();
    if mode == Mode::Discover {
        return run_discovery(source, options.backend, &formatter, out).await;
    }

    let path = options.config_file.as_deref().ok_or(RunError::MissingConfigFile)?;
    let mut matcher = ReadingMatcher::new(config::load(path)?);
    let sink = match mode {
        Mode::Upload => ReadingSink::Upload(Uploader::new(transport)),
        _ => ReadingSink::Print,
    };

    run_readings(&mut matcher, &sink, source, options.backend, &formatter, out).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::{AD_TYPE_COMPLETE_LOCAL_NAME, AdElement, encode};
    use crate::mac_address::MacAddress;
    use crate::test_utils::{
        FakeTransport, ManualClock, TEST_MAC, sensor_advertisement_payload, sensor_config, sensors,
    };
    use std::sync::Mutex;

    const OTHER_MAC: MacAddress = MacAddress([0x30, 0xAE, 0xA4, 0x00, 0x00, 0x02]);

    #[derive(Debug)]
    struct FakeSource {
        advertisements: Mutex<Vec<RawAdvertisement>>,
    }

    impl FakeSource {
        fn new(advertisements: Vec<RawAdvertisement>) -> Self {
            Self {
                advertisements: Mutex::new(advertisements),
            }
        }
    }

    impl AdvertisementSource for FakeSource {
        fn start(&self, _backend: Backend) -> ScanFuture<'_> {
            let advertisements = self.advertisements.lock().unwrap().clone();
            Box::pin(async move {
                let (tx, rx) = mpsc::channel::<RawAdvertisement>(advertisements.len().max(1));
                tokio::spawn(async move {
                    for a in advertisements {
                        let _ = tx.send(a).await;
                    }
                    // drop tx to close channel
                });
                Ok(rx)
            })
        }
    }

    fn sensor_raw(mac: MacAddress, raw_temperature: u16, raw_humidity: u16) -> RawAdvertisement {
        RawAdvertisement {
            mac,
            payload: Some(sensor_advertisement_payload(raw_temperature, raw_humidity)),
            rssi: -60,
        }
    }

    fn name_only_raw(mac: MacAddress) -> RawAdvertisement {
        let payload = encode(&[AdElement::new(AD_TYPE_COMPLETE_LOCAL_NAME, *b"Phone")]).unwrap();
        RawAdvertisement {
            mac,
            payload: Some(payload),
            rssi: -80,
        }
    }

    fn options(args: &[&str]) -> Options {
        Options::try_parse_from(std::iter::once("btle-sensor-scanner").chain(args.iter().copied()))
            .unwrap()
    }

    fn matcher() -> ReadingMatcher<ManualClock> {
        let config = sensors([
            (TEST_MAC, sensor_config("Living Room", 60)),
            (OTHER_MAC, sensor_config("Sauna", 60)),
        ]);
        ReadingMatcher::with_clock(config, ManualClock::new(1_700_000_000))
    }

    fn write_config(test_name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "btle-sensor-scanner-{}-{test_name}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
            ["30:AE:A4:00:00:01"]
            name = "Living Room"
            home_assistant_url = "http://hass.local:8123"
            home_assistant_key = "secret"
            duplicate_time = 3600
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn mode_defaults_to_print() {
        assert_eq!(options(&["-f", "sensors.toml"]).mode(), Mode::Print);
        assert_eq!(options(&["--file", "sensors.toml", "--print"]).mode(), Mode::Print);
        assert_eq!(options(&["-f", "sensors.toml", "-u"]).mode(), Mode::Upload);
        assert_eq!(options(&["-d"]).mode(), Mode::Discover);
    }

    #[test]
    fn mode_flags_are_exclusive() {
        let result = Options::try_parse_from(["btle-sensor-scanner", "-d", "-u"]);
        assert!(result.is_err());
    }

    #[test]
    fn config_file_required_unless_discovering() {
        assert!(matches!(options(&["-p"]).validate(), Err(RunError::MissingConfigFile)));
        assert!(matches!(options(&["-u"]).validate(), Err(RunError::MissingConfigFile)));
        assert!(options(&["-d"]).validate().is_ok());
        assert!(options(&["-u", "-f", "sensors.toml"]).validate().is_ok());
    }

    #[tokio::test]
    async fn discovery_prints_each_compatible_device_once() {
        let source = FakeSource::new(vec![
            sensor_raw(TEST_MAC, 235, 412),
            sensor_raw(TEST_MAC, 236, 412),
            name_only_raw(OTHER_MAC),
            RawAdvertisement {
                mac: MacAddress([0x30, 0xAE, 0xA4, 0x00, 0x00, 0x03]),
                payload: None,
                rssi: -70,
            },
        ]);

        let mut out = Vec::<u8>::new();
        run_with_io(options(&["-d"]), &source, &FakeTransport::default(), &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "30:AE:A4:00:00:01 NN Sensor\n");
    }

    #[tokio::test]
    async fn prints_readings_of_configured_sensors() {
        let source = FakeSource::new(vec![
            sensor_raw(TEST_MAC, 235, 412),
            sensor_raw(MacAddress([0x30, 0xAE, 0xA4, 0x00, 0x00, 0x09]), 100, 100),
            sensor_raw(OTHER_MAC, 801, 120),
        ]);

        let mut out = Vec::<u8>::new();
        run_readings(
            &mut matcher(),
            &ReadingSink::Print,
            &source,
            Backend::default(),
            &TextFormatter,
            &mut out,
        )
        .await
        .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(
            out.lines().collect::<Vec<_>>(),
            vec![
                "Living Room (30:AE:A4:00:00:01): Temperature 23.5 °C, Humidity 41.2 %",
                "Sauna (30:AE:A4:00:00:02): Temperature 80.1 °C, Humidity 12.0 %",
            ]
        );
    }

    #[tokio::test]
    async fn duplicates_within_window_are_suppressed() {
        let source = FakeSource::new(vec![
            sensor_raw(TEST_MAC, 235, 412),
            sensor_raw(TEST_MAC, 236, 413),
        ]);

        let mut out = Vec::<u8>::new();
        run_readings(
            &mut matcher(),
            &ReadingSink::Print,
            &source,
            Backend::default(),
            &TextFormatter,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn undecodable_advertisement_does_not_end_session() {
        let source = FakeSource::new(vec![name_only_raw(TEST_MAC), sensor_raw(OTHER_MAC, 801, 120)]);

        let mut out = Vec::<u8>::new();
        run_readings(
            &mut matcher(),
            &ReadingSink::Print,
            &source,
            Backend::default(),
            &TextFormatter,
            &mut out,
        )
        .await
        .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("Sauna "));
    }

    #[tokio::test]
    async fn failed_upload_does_not_end_session() {
        let source = FakeSource::new(vec![sensor_raw(TEST_MAC, 235, 412), sensor_raw(OTHER_MAC, 801, 120)]);
        let transport = FakeTransport::new(vec![Ok(404)]);

        let mut out = Vec::<u8>::new();
        run_readings(
            &mut matcher(),
            &ReadingSink::Upload(Uploader::new(&transport)),
            &source,
            Backend::default(),
            &TextFormatter,
            &mut out,
        )
        .await
        .unwrap();

        assert!(out.is_empty());
        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "http://hass.local:8123/api/states/sensor.Living_Room_Temperature_temperature",
                "http://hass.local:8123/api/states/sensor.Sauna_Temperature_temperature",
                "http://hass.local:8123/api/states/sensor.Sauna_Humidity_humidity",
            ]
        );
    }

    #[tokio::test]
    async fn upload_mode_loads_config_file() {
        let path = write_config("upload");
        let source = FakeSource::new(vec![sensor_raw(TEST_MAC, 235, 412), sensor_raw(OTHER_MAC, 1, 1)]);
        let transport = FakeTransport::default();

        let mut out = Vec::<u8>::new();
        let result = run_with_io(
            options(&["-u", "-f", path.to_str().unwrap()]),
            &source,
            &transport,
            &mut out,
        )
        .await;
        std::fs::remove_file(&path).unwrap();

        result.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].access_key, "secret");
        assert_eq!(requests[1].body.attributes.friendly_name, "Living Room Humidity");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn print_mode_without_config_fails() {
        let source = FakeSource::new(vec![]);
        let mut out = Vec::<u8>::new();

        let err = run_with_io(options(&["-p"]), &source, &FakeTransport::default(), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::MissingConfigFile));
    }

    #[tokio::test]
    async fn unreadable_config_fails() {
        let source = FakeSource::new(vec![]);
        let mut out = Vec::<u8>::new();

        let err = run_with_io(
            options(&["-f", "/nonexistent/sensors.toml"]),
            &source,
            &FakeTransport::default(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunError::Config(ConfigError::Io { .. })));
    }
}
