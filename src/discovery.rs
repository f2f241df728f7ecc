//! Discovery of compatible beacons in range.
//!
//! Beacons advertise several times per second, so each MAC address is looked
//! at once per session: the first advertisement decides whether the device is
//! reported, and every later one is ignored without further decoding.

use crate::advertisement::{AD_TYPE_COMPLETE_LOCAL_NAME, Advertisement};
use crate::mac_address::MacAddress;
use crate::vendor;
use std::collections::HashSet;

/// A compatible device seen for the first time in this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub mac: MacAddress,
    /// Advertised local name, if the beacon sends one.
    pub name: Option<String>,
}

/// First-seen-wins matcher over a live advertisement stream.
#[derive(Debug, Default)]
pub struct Discovery {
    known: HashSet<MacAddress>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one advertisement.
    ///
    /// Returns the device the first time a compatible MAC is seen. A MAC whose
    /// first advertisement is incompatible stays known and is never reported.
    pub fn on_advertisement(&mut self, ad: &Advertisement) -> Option<DiscoveredDevice> {
        if !self.known.insert(ad.mac) {
            return None;
        }

        if !vendor::is_compatible(&ad.elements) {
            tracing::debug!(mac = %ad.mac, "ignoring incompatible device");
            return None;
        }

        let name = ad
            .find(AD_TYPE_COMPLETE_LOCAL_NAME)
            .map(|e| String::from_utf8_lossy(&e.data).into_owned());

        Some(DiscoveredDevice { mac: ad.mac, name })
    }

    /// Number of distinct MACs seen so far.
    pub fn known_count(&self) -> usize {
        self.known.len()
    }
}
