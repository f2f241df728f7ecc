use crate::advertisement::{self, Advertisement};
use crate::config::{SensorConfig, SensorMap};
use crate::mac_address::MacAddress;
use crate::reading::Clock;
use crate::upload::{StateUpdate, Transport, TransportError, TransportFuture, TransportResponse};
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Mutex;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0x30, 0xAE, 0xA4, 0x00, 0x00, 0x01]);

/// Payload as broadcast by the sensor firmware: flags, local name, then
/// manufacturer data with both fields present.
pub fn sensor_advertisement_payload(raw_temperature: u16, raw_humidity: u16) -> Vec<u8> {
    let [t0, t1] = raw_temperature.to_le_bytes();
    let [h0, h1] = raw_humidity.to_le_bytes();
    let mut payload = vec![0x02, 0x01, 0x06];
    payload.extend_from_slice(&[0x0A, 0x09]);
    payload.extend_from_slice(b"NN Sensor");
    payload.extend_from_slice(&[0x08, 0xFF, 0xFF, 0xFF, 0x03, t0, t1, h0, h1]);
    payload
}

pub fn advertisement(mac: MacAddress, elements: Vec<advertisement::AdElement>) -> Advertisement {
    Advertisement {
        mac,
        elements,
        rssi: -60,
    }
}

/// Decoded sensor advertisement carrying the given raw values.
pub fn sensor_ad(mac: MacAddress, raw_temperature: u16, raw_humidity: u16) -> Advertisement {
    let payload = sensor_advertisement_payload(raw_temperature, raw_humidity);
    advertisement(mac, advertisement::decode(&payload))
}

pub fn sensor_config(name: &str, duplicate_time: u64) -> SensorConfig {
    SensorConfig {
        name: name.to_string(),
        home_assistant_url: "http://hass.local:8123".to_string(),
        home_assistant_key: "secret".to_string(),
        duplicate_time,
        last_reading_timestamp: None,
    }
}

pub fn sensors(entries: impl IntoIterator<Item = (MacAddress, SensorConfig)>) -> SensorMap {
    entries.into_iter().collect()
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(Rc::new(Cell::new(now)))
    }

    pub fn set(&self, now: i64) {
        self.0.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.get()
    }
}

/// Records requests and answers them with canned statuses, in order.
/// Requests past the end of the script are answered with 200.
#[derive(Debug, Default)]
pub struct FakeTransport {
    statuses: Mutex<VecDeque<Result<u16, TransportError>>>,
    requests: Mutex<Vec<StateUpdate>>,
}

impl FakeTransport {
    pub fn new(statuses: Vec<Result<u16, TransportError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<StateUpdate> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn post(&self, request: StateUpdate) -> TransportFuture<'_> {
        self.requests.lock().unwrap().push(request);
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(Ok(200));
        Box::pin(async move {
            status.map(|status| TransportResponse {
                status,
                body: "{}".to_string(),
            })
        })
    }
}
