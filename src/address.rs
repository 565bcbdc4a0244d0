//! Hardware addresses of peers on the radio link.
//!
//! Addresses are fixed 6-byte identifiers. They are written as colon-separated
//! upper-case hex pairs, e.g. `AA:BB:CC:DD:EE:FF`, and parsed case-insensitively.

use core::fmt;
use core::fmt::Write;
use core::str::FromStr;

use heapless::String;

use crate::consts::{ADDRESS_LEN, ADDRESS_STR_LEN};

/// A 6-byte hardware address identifying one node on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct MacAddress(pub [u8; ADDRESS_LEN]);

impl MacAddress {
    /// The broadcast address, reaching every node on the channel.
    pub const BROADCAST: MacAddress = MacAddress([0xff; ADDRESS_LEN]);

    /// Creates an address from its raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    pub const fn octets(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }

    /// Whether this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Formats the address into a fixed-capacity string.
    pub fn to_hex_string(&self) -> String<ADDRESS_STR_LEN> {
        let mut out = String::new();
        // Exactly ADDRESS_STR_LEN characters are written.
        let _ = write!(out, "{}", self);
        out
    }
}

impl From<[u8; ADDRESS_LEN]> for MacAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(':')?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Returned when a string is not a colon-separated 6-byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[error("malformed hardware address")]
pub struct AddressParseError;

impl FromStr for MacAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ADDRESS_STR_LEN {
            return Err(AddressParseError);
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(AddressParseError)?;
            if part.len() != 2 || !part.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(AddressParseError);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| AddressParseError)?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError);
        }
        Ok(Self(bytes))
    }
}

/// Formats `address` as `AA:BB:CC:DD:EE:FF`.
pub fn address_to_string(address: &MacAddress) -> String<ADDRESS_STR_LEN> {
    address.to_hex_string()
}

/// Parses a colon-separated address, returning `None` when malformed.
pub fn string_to_address(s: &str) -> Option<MacAddress> {
    s.parse().ok()
}
