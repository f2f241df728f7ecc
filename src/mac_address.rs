//! Hardware address of an advertising device.
//!
//! Addresses are kept as a 6-byte array so they are cheap to copy and hash, and
//! are only turned into the colon-hex form when printed or used in logs.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A BTLE device address in transmission-independent (big-endian) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Build an address from the little-endian byte order used on the HCI wire.
    pub fn from_le_bytes(mut bytes: [u8; 6]) -> Self {
        bytes.reverse();
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing a colon-hex address string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address '{input}': expected 6 colon-separated octets, got {parts}")]
    WrongOctetCount { input: String, parts: usize },
    #[error("invalid MAC address '{input}': octet '{octet}' is not two hex digits")]
    InvalidOctet { input: String, octet: String },
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let octets: Vec<&str> = input.split(':').collect();
        if octets.len() != 6 {
            return Err(ParseMacError::WrongOctetCount {
                input: input.to_string(),
                parts: octets.len(),
            });
        }

        let mut bytes = [0u8; 6];
        for (slot, octet) in bytes.iter_mut().zip(&octets) {
            let valid = octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit());
            *slot = u8::from_str_radix(octet, 16)
                .ok()
                .filter(|_| valid)
                .ok_or_else(|| ParseMacError::InvalidOctet {
                    input: input.to_string(),
                    octet: octet.to_string(),
                })?;
        }

        Ok(MacAddress(bytes))
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}
