//! Upload of readings to Home Assistant.
//!
//! Every measurement of a reading becomes one state update of a
//! `sensor.<slug>_<kind>` entity through the REST API:
//!
//! ```text
//! POST {home_assistant_url}/api/states/sensor.Living_Room_Temperature_temperature
//! X-HA-Access: {home_assistant_key}
//!
//! {"state":23.5,"attributes":{"unit_of_measurement":"°C","friendly_name":"Living Room Temperature"}}
//! ```
//!
//! The HTTP client sits behind [`Transport`] so the dispatcher can be tested
//! without a server.

pub mod http;

use crate::config::SensorConfig;
use crate::measurement::{MeasurementKind, Reading};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Header carrying the Home Assistant API password.
pub const ACCESS_HEADER: &str = "X-HA-Access";

/// Body of a state update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateBody {
    pub state: f64,
    pub attributes: StateAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateAttributes {
    pub unit_of_measurement: String,
    pub friendly_name: String,
}

/// One outbound state update request.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub url: String,
    pub access_key: String,
    pub body: StateBody,
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// The request could not be completed (connection, TLS, timeout, ...).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// HTTP transport abstraction to enable deterministic unit tests without a server.
pub trait Transport: Send + Sync {
    fn post(&self, request: StateUpdate) -> TransportFuture<'_>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("unexpected response uploading {kind}: HTTP {status}: {body}")]
    UnexpectedResponse {
        kind: MeasurementKind,
        status: u16,
        body: String,
    },
    #[error("failed to upload {kind}: {message}")]
    Transport {
        kind: MeasurementKind,
        message: String,
    },
}

/// Entity id fragment: whitespace replaced by underscores, case preserved.
pub fn slug(friendly_name: &str) -> String {
    friendly_name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Build the state update for one measurement of `sensor`.
pub fn state_update(sensor: &SensorConfig, kind: MeasurementKind, value: f64) -> StateUpdate {
    let friendly_name = format!("{} {}", sensor.name, kind.label());
    let url = format!(
        "{}/api/states/sensor.{}_{}",
        sensor.home_assistant_url.trim_end_matches('/'),
        slug(&friendly_name),
        kind.as_str()
    );

    StateUpdate {
        url,
        access_key: sensor.home_assistant_key.clone(),
        body: StateBody {
            state: value,
            attributes: StateAttributes {
                unit_of_measurement: kind.unit().to_string(),
                friendly_name,
            },
        },
    }
}

/// Sends readings to Home Assistant, one request per measurement.
pub struct Uploader<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Uploader<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Upload every measurement of `reading` in order.
    ///
    /// Stops at the first failed measurement. Measurements already sent stay sent.
    pub async fn upload(&self, sensor: &SensorConfig, reading: &Reading) -> Result<(), UploadError> {
        for &(kind, value) in &reading.values {
            let request = state_update(sensor, kind, value);
            tracing::debug!(url = %request.url, value, "posting state");

            let response = self
                .transport
                .post(request)
                .await
                .map_err(|e| UploadError::Transport {
                    kind,
                    message: e.0,
                })?;

            if !matches!(response.status, 200 | 201) {
                return Err(UploadError::UnexpectedResponse {
                    kind,
                    status: response.status,
                    body: response.body,
                });
            }
        }

        Ok(())
    }
}
