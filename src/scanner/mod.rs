//! BLE advertisement sources.
//!
//! Backends deliver every advertisement they observe as a
//! [`RawAdvertisement`]; decoding and matching happen downstream so the
//! backends stay free of sensor-specific logic.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::advertisement::RawAdvertisement;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Channel buffer size for raw advertisements.
///
/// Advertisements arriving while the buffer is full (e.g. during a slow
/// upload) are dropped by the backend.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
        }
    }
}

/// Hand an advertisement to the session loop without waiting.
///
/// Returns `false` once the receiving side is gone and the backend should stop.
pub(crate) fn forward(tx: &mpsc::Sender<RawAdvertisement>, advertisement: RawAdvertisement) -> bool {
    match tx.try_send(advertisement) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            tracing::trace!(mac = %dropped.mac, "session busy, dropping advertisement");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Start scanning with the specified backend.
///
/// # Returns
/// A receiver yielding every advertisement seen until the backend stops.
pub async fn start_scan(backend: Backend) -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    tracing::info!(%backend, "starting scan");
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan().await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;
    use clap::ValueEnum;

    fn raw(rssi: i16) -> RawAdvertisement {
        RawAdvertisement {
            mac: TEST_MAC,
            payload: Some(vec![0x02, 0x01, 0x06]),
            rssi,
        }
    }

    #[test]
    fn forward_drops_when_full_and_stops_when_closed() {
        let (tx, mut rx) = mpsc::channel(1);

        assert!(forward(&tx, raw(-50)));
        assert!(forward(&tx, raw(-60)));
        assert_eq!(rx.try_recv().unwrap().rssi, -50);
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(!forward(&tx, raw(-70)));
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter not found".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter not found");
    }

    #[test]
    fn test_backend_from_str() {
        #[cfg(feature = "bluer")]
        assert_eq!(Backend::from_str("bluer", true).unwrap(), Backend::Bluer);
        #[cfg(feature = "hci")]
        assert_eq!(Backend::from_str("hci", true).unwrap(), Backend::Hci);
        assert!(Backend::from_str("invalid", true).is_err());
    }

    #[test]
    fn test_backend_display() {
        #[cfg(feature = "bluer")]
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        #[cfg(feature = "hci")]
        assert_eq!(format!("{}", Backend::Hci), "hci");
    }

    #[test]
    fn default_backend_parses_from_its_name() {
        let backend = Backend::default();
        assert_eq!(Backend::from_str(&backend.to_string(), true).unwrap(), backend);
    }
}
