//! Link-layer addressing
//!
//! Every radio is identified by its 6-byte MAC address. Equality is
//! byte-exact; the all-ones address means "every radio in range".

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::MeshError;

/// Length of a link-layer address in bytes
pub const ADDRESS_LEN: usize = 6;

/// 6-byte link-layer address of a radio
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress([u8; ADDRESS_LEN]);

impl MacAddress {
    /// The reserved broadcast address `FF:FF:FF:FF:FF:FF`
    pub const BROADCAST: MacAddress = MacAddress([0xFF; ADDRESS_LEN]);

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an address with every byte set to `byte` (handy for fixtures)
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; ADDRESS_LEN])
    }

    /// Copy an address out of a slice that holds at least 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; ADDRESS_LEN] = bytes.get(..ADDRESS_LEN)?.try_into().ok()?;
        Some(Self(raw))
    }

    /// Raw address bytes
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; ADDRESS_LEN]> for MacAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl FromStr for MacAddress {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; ADDRESS_LEN];
        let mut parts = s.trim().split([':', '-']);

        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| MeshError::InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(MeshError::InvalidAddress(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| MeshError::InvalidAddress(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(MeshError::InvalidAddress(s.to_string()));
        }

        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let addr = MacAddress::new([0xAA, 0xBB, 0x01, 0x02, 0x0C, 0xFF]);
        assert_eq!(addr.to_string(), "AA:BB:01:02:0C:FF");
        assert_eq!("AA:BB:01:02:0C:FF".parse::<MacAddress>().unwrap(), addr);
        assert_eq!("aa-bb-01-02-0c-ff".parse::<MacAddress>().unwrap(), addr);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("AA:BB:CC".parse::<MacAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:FF:00".parse::<MacAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:GG".parse::<MacAddress>().is_err());
        assert!("AAA:BB:CC:DD:EE:F".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_broadcast() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(!MacAddress::repeat(0xAA).is_broadcast());
        assert_eq!(MacAddress::BROADCAST.to_string(), "FF:FF:FF:FF:FF:FF");
    }

    #[test]
    fn test_from_slice() {
        let raw = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(
            MacAddress::from_slice(&raw),
            Some(MacAddress::new([1, 2, 3, 4, 5, 6]))
        );
        assert_eq!(MacAddress::from_slice(&raw[..5]), None);
    }

    #[test]
    fn test_serde_as_string() {
        let addr = MacAddress::repeat(0xBB);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"BB:BB:BB:BB:BB:BB\"");
        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
