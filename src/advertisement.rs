//! Advertisement payload decoding.
//!
//! A BTLE advertisement payload is a run of AD structures, each laid out as
//! `length | type | data`, where `length` counts the type byte plus the data.
//! Real-world beacon firmware frequently pads or truncates the tail of the
//! payload, so decoding stops quietly at the first record that does not fit
//! instead of rejecting the whole payload.

use crate::mac_address::MacAddress;
use thiserror::Error;

/// AD type carrying vendor-defined bytes, prefixed by a 2-byte vendor identifier.
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// AD type carrying the complete local name of the device.
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// One decoded AD structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdElement {
    pub element_type: u8,
    pub data: Vec<u8>,
}

impl AdElement {
    pub fn new(element_type: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            element_type,
            data: data.into(),
        }
    }
}

/// Errors returned when encoding elements back into a payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("AD element of type {element_type:#04x} carries {len} bytes (at most 254 fit)")]
    ElementTooLong { element_type: u8, len: usize },
}

/// An advertisement as produced by a scanner backend, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAdvertisement {
    pub mac: MacAddress,
    /// `None` when the backend saw the device but no advertising data.
    pub payload: Option<Vec<u8>>,
    pub rssi: i16,
}

/// A decoded advertisement event.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub mac: MacAddress,
    pub elements: Vec<AdElement>,
    pub rssi: i16,
}

impl Advertisement {
    /// Decode a raw event. Events without a payload are skipped.
    pub fn from_raw(raw: &RawAdvertisement) -> Option<Self> {
        let payload = raw.payload.as_deref()?;
        Some(Self {
            mac: raw.mac,
            elements: decode(payload),
            rssi: raw.rssi,
        })
    }

    /// First element of the given type, if any.
    pub fn find(&self, element_type: u8) -> Option<&AdElement> {
        find(&self.elements, element_type)
    }
}

/// First element of the given type in `elements`.
pub fn find(elements: &[AdElement], element_type: u8) -> Option<&AdElement> {
    elements.iter().find(|e| e.element_type == element_type)
}

/// Split a payload into its AD structures.
///
/// A zero length byte or a record running past the end of the payload ends
/// decoding; everything decoded so far is returned.
pub fn decode(payload: &[u8]) -> Vec<AdElement> {
    let mut elements = Vec::new();
    let mut rest = payload;

    while let Some((&length, tail)) = rest.split_first() {
        let length = usize::from(length);
        if length == 0 || tail.len() < length {
            break;
        }

        let (record, remainder) = tail.split_at(length);
        elements.push(AdElement::new(record[0], &record[1..]));
        rest = remainder;
    }

    elements
}

/// Serialize elements into a payload that [`decode`] turns back into the same elements.
pub fn encode(elements: &[AdElement]) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::with_capacity(elements.iter().map(|e| e.data.len() + 2).sum());

    for element in elements {
        let length = u8::try_from(element.data.len() + 1).map_err(|_| EncodeError::ElementTooLong {
            element_type: element.element_type,
            len: element.data.len(),
        })?;
        payload.push(length);
        payload.push(element.element_type);
        payload.extend_from_slice(&element.data);
    }

    Ok(payload)
}
