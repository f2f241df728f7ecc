//! Vendor identification of sensor beacons.

use crate::advertisement::{AD_TYPE_MANUFACTURER_DATA, AdElement, find};

/// Vendor identifier carried by compatible beacons in the first two bytes of
/// their manufacturer data. `0xFFFF` is the Bluetooth SIG "no company" value
/// that the sensor firmware advertises under.
pub const VENDOR_ID: [u8; 2] = [0xFF, 0xFF];

/// Payload of the manufacturer-data element, vendor identifier included.
pub fn manufacturer_data(elements: &[AdElement]) -> Option<&[u8]> {
    find(elements, AD_TYPE_MANUFACTURER_DATA).map(|e| e.data.as_slice())
}

/// Whether the elements come from a compatible beacon.
///
/// Beacons without manufacturer data cannot carry readings and are never compatible.
pub fn is_compatible(elements: &[AdElement]) -> bool {
    manufacturer_data(elements).is_some_and(|data| data.starts_with(&VENDOR_ID))
}
