//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! BlueZ hands out parsed device properties rather than raw advertising data,
//! so the payload is re-assembled from the manufacturer data and local name
//! before it is passed on.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, ScanError, forward};
use crate::advertisement::{
    AD_TYPE_COMPLETE_LOCAL_NAME, AD_TYPE_MANUFACTURER_DATA, AdElement, RawAdvertisement, encode,
};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start LE discovery on the default adapter.
///
/// Property changes of known devices are reported as well, so every new
/// advertisement of a device produces a new event.
pub async fn start_scan() -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let events = adapter.discover_devices_with_changes().await?;
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let mut events = Box::pin(events);

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };

            match read_advertisement(&adapter, address).await {
                Ok(Some(advertisement)) => {
                    if !forward(&tx, advertisement) {
                        break;
                    }
                }
                Ok(None) => tracing::trace!(%address, "cached device not seen in this discovery"),
                Err(e) => tracing::debug!(%address, error = %e, "failed to read device properties"),
            }
        }

        tracing::debug!("BlueZ discovery stopped");
    });

    Ok(rx)
}

async fn read_advertisement(adapter: &Adapter, address: Address) -> Result<Option<RawAdvertisement>, ScanError> {
    let device = adapter.device(address)?;
    let rssi = device.rssi().await?;
    if rssi.is_none() {
        return Ok(None);
    }

    let manufacturer_data = device.manufacturer_data().await?;
    let name = device.name().await?;

    Ok(advertisement_from_properties(
        address,
        manufacturer_data.as_ref(),
        name.as_deref(),
        rssi,
    ))
}

/// Build the advertisement for a device event.
///
/// BlueZ replays every cached device when discovery starts; only devices
/// heard during the current discovery carry an RSSI. Without one the
/// properties are stale and no advertisement is produced.
fn advertisement_from_properties(
    address: Address,
    manufacturer_data: Option<&HashMap<u16, Vec<u8>>>,
    name: Option<&str>,
    rssi: Option<i16>,
) -> Option<RawAdvertisement> {
    Some(RawAdvertisement {
        mac: address.into(),
        payload: payload_from_properties(manufacturer_data, name),
        rssi: rssi?,
    })
}

/// Re-assemble an advertising payload from parsed device properties.
///
/// Each manufacturer data entry becomes a `0xFF` element led by its company
/// id in little-endian order, followed by a `0x09` element for the name.
/// Returns `None` when the device exposed neither.
fn payload_from_properties(
    manufacturer_data: Option<&HashMap<u16, Vec<u8>>>,
    name: Option<&str>,
) -> Option<Vec<u8>> {
    let mut entries: Vec<_> = manufacturer_data.into_iter().flatten().collect();
    entries.sort_unstable_by_key(|(company_id, _)| **company_id);

    let mut elements: Vec<AdElement> = entries
        .into_iter()
        .map(|(company_id, data)| {
            let mut bytes = company_id.to_le_bytes().to_vec();
            bytes.extend_from_slice(data);
            AdElement::new(AD_TYPE_MANUFACTURER_DATA, bytes)
        })
        .collect();
    elements.extend(name.map(|name| AdElement::new(AD_TYPE_COMPLETE_LOCAL_NAME, name.as_bytes())));

    if elements.is_empty() {
        return None;
    }

    encode(&elements)
        .map_err(|e| tracing::debug!(error = %e, "cannot re-assemble advertisement"))
        .ok()
}
