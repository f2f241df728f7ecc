//! `reqwest` backed transport for state updates.

use super::{ACCESS_HEADER, StateUpdate, Transport, TransportError, TransportFuture, TransportResponse};
use std::time::Duration;

/// Per-request timeout of the HTTP client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// Posts state updates over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: StateUpdate) -> TransportFuture<'_> {
        Box::pin(async move {
            let response = self
                .client
                .post(&request.url)
                .header(ACCESS_HEADER, &request.access_key)
                .json(&request.body)
                .send()
                .await?;

            let status = response.status().as_u16();
            // The body only ends up in error messages; an unreadable one is not fatal.
            let body = response.text().await.unwrap_or_default();

            Ok(TransportResponse { status, body })
        })
    }
}
