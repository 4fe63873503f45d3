//! Flow account addresses and chain identifiers.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseAddressError;

/// An 8-byte Flow account address.
///
/// Addresses render as 16 lowercase hex characters without a prefix and
/// parse with or without `0x`. Short literals such as `0x1` are left-padded.
///
/// # Examples
///
/// ```
/// use flowkit::{Address, ChainId};
///
/// let service: Address = "0xf8d6e0586b0a20c7".parse().unwrap();
/// assert!(service.is_valid(ChainId::Emulator));
/// assert!(!service.is_valid(ChainId::Mainnet));
/// assert_eq!(service.to_string(), "f8d6e0586b0a20c7");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; 8]);

impl Address {
    /// The empty (all-zero) address.
    pub const EMPTY: Self = Self([0; 8]);

    /// Length of an address in bytes.
    pub const LENGTH: usize = 8;

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create from the big-endian integer form.
    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Big-endian integer form.
    pub const fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// Check if this is the empty address.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 8]
    }

    /// Render with a `0x` prefix, the form Cadence source expects.
    pub fn to_hex_prefixed(&self) -> String {
        format!("0x{}", self)
    }

    /// Check the address against the error-detecting code of `chain`.
    ///
    /// Every chain offsets its address space by a codeword; a valid address
    /// XORed with that codeword is a non-zero codeword of the shared
    /// linear code, which is checked with the parity-check matrix below.
    pub fn is_valid(&self, chain: ChainId) -> bool {
        let mut word = self.to_u64() ^ chain.codeword();
        if word == 0 {
            return false;
        }

        let mut parity: u32 = 0;
        for column in PARITY_CHECK_COLUMNS {
            if word & 1 == 1 {
                parity ^= column;
            }
            word >>= 1;
        }
        parity == 0
    }
}

/// Columns of the parity-check matrix for the 64-bit address code.
const PARITY_CHECK_COLUMNS: [u32; 64] = [
    0x00001, 0x00002, 0x00004, 0x00008, 0x00010, 0x00020, 0x00040, 0x00080, 0x00100, 0x00200,
    0x00400, 0x00800, 0x01000, 0x02000, 0x04000, 0x08000, 0x10000, 0x20000, 0x40000, 0x7328d,
    0x6689a, 0x6112f, 0x6084b, 0x433fd, 0x42aab, 0x41951, 0x233ce, 0x22a81, 0x21948, 0x1ef60,
    0x1deca, 0x1c639, 0x1bdd8, 0x1a535, 0x194ac, 0x18c46, 0x1632b, 0x1529b, 0x14a43, 0x13184,
    0x12942, 0x118c1, 0x0f812, 0x0e027, 0x0d00e, 0x0c83c, 0x0b01d, 0x0a831, 0x0982b, 0x07034,
    0x0682a, 0x05819, 0x03807, 0x007d2, 0x00727, 0x0068e, 0x0067c, 0x0059d, 0x004eb, 0x003b4,
    0x0036a, 0x002d9, 0x001c7, 0x0003f,
];

/// First generated address on mainnet, before any chain offset.
const ROOT_SERVICE_ADDRESS: u64 = 0xe467b9dd11fa00df;

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.is_empty() {
            return Err(ParseAddressError::Empty);
        }
        if hex_part.len() > 16 {
            return Err(ParseAddressError::TooLong(s.to_string()));
        }

        let value = u64::from_str_radix(hex_part, 16)
            .map_err(|_| ParseAddressError::InvalidHex(s.to_string()))?;
        Ok(Self::from_u64(value))
    }
}

impl TryFrom<&str> for Address {
    type Error = ParseAddressError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = ParseAddressError;

    /// Bytes shorter than eight are left-padded, longer ones rejected.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() > 8 {
            return Err(ParseAddressError::TooLong(hex::encode(bytes)));
        }
        let mut arr = [0u8; 8];
        arr[8 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ChainId
// ============================================================================

/// Flow chain an address space belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainId {
    Mainnet,
    Testnet,
    Emulator,
}

impl ChainId {
    /// Codeword that offsets this chain's address space.
    pub const fn codeword(&self) -> u64 {
        match self {
            ChainId::Mainnet => 0,
            ChainId::Testnet => 0x6834ba37b3980209,
            ChainId::Emulator => 0x1cb159857af02018,
        }
    }

    /// Canonical chain identifier string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChainId::Mainnet => "flow-mainnet",
            ChainId::Testnet => "flow-testnet",
            ChainId::Emulator => "flow-emulator",
        }
    }

    /// Address of the service account on this chain.
    pub const fn service_address(&self) -> Address {
        Address::from_u64(ROOT_SERVICE_ADDRESS ^ self.codeword())
    }

    /// Map a network name from the configuration to its chain.
    ///
    /// Returns `None` for custom networks, whose chain cannot be inferred.
    pub fn from_network_name(name: &str) -> Option<Self> {
        match name {
            "emulator" | "testing" => Some(ChainId::Emulator),
            "testnet" | "previewnet" | "migrationnet" | "crescendo" => Some(ChainId::Testnet),
            "mainnet" => Some(ChainId::Mainnet),
            _ => None,
        }
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow-mainnet" => Ok(ChainId::Mainnet),
            "flow-testnet" => Ok(ChainId::Testnet),
            "flow-emulator" => Ok(ChainId::Emulator),
            other => ChainId::from_network_name(other)
                .ok_or_else(|| format!("unknown chain '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let a = addr("0xf8d6e0586b0a20c7");
        assert_eq!(a.to_string(), "f8d6e0586b0a20c7");
        assert_eq!(a.to_hex_prefixed(), "0xf8d6e0586b0a20c7");
        assert_eq!(addr("f8d6e0586b0a20c7"), a);
    }

    #[test]
    fn test_parse_short_is_left_padded() {
        assert_eq!(addr("0x1").to_string(), "0000000000000001");
        assert_eq!(addr("01").to_u64(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Address>(), Err(ParseAddressError::Empty));
        assert_eq!("0x".parse::<Address>(), Err(ParseAddressError::Empty));
        assert!(matches!(
            "0x11111111111111111".parse::<Address>(),
            Err(ParseAddressError::TooLong(_))
        ));
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(ParseAddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_try_from_bytes_left_pads() {
        let a = Address::try_from(&[0x01, 0x02][..]).unwrap();
        assert_eq!(a.to_string(), "0000000000000102");
        assert!(Address::try_from(&[0u8; 9][..]).is_err());
    }

    #[test]
    fn test_service_addresses() {
        assert_eq!(
            ChainId::Mainnet.service_address(),
            addr("e467b9dd11fa00df")
        );
        assert_eq!(
            ChainId::Testnet.service_address(),
            addr("8c5303eaa26202d6")
        );
        assert_eq!(
            ChainId::Emulator.service_address(),
            addr("f8d6e0586b0a20c7")
        );
    }

    #[test]
    fn test_validity_per_chain() {
        let mainnet = ["e467b9dd11fa00df", "1654653399040a61", "f233dcee88fe0abe", "1d7e57aa55817448"];
        let testnet = ["8c5303eaa26202d6", "9a0766d93b6608b7", "7e60df042a9c0868"];
        let emulator = [
            "f8d6e0586b0a20c7",
            "ee82856bf20e2aa6",
            "0ae53cb6e3f42a79",
            "01cf0e2f2f715450",
            "179b6b1cb6755e31",
        ];

        for a in mainnet {
            assert!(addr(a).is_valid(ChainId::Mainnet), "{a} on mainnet");
            assert!(!addr(a).is_valid(ChainId::Testnet), "{a} on testnet");
            assert!(!addr(a).is_valid(ChainId::Emulator), "{a} on emulator");
        }
        for a in testnet {
            assert!(addr(a).is_valid(ChainId::Testnet), "{a} on testnet");
            assert!(!addr(a).is_valid(ChainId::Mainnet), "{a} on mainnet");
            assert!(!addr(a).is_valid(ChainId::Emulator), "{a} on emulator");
        }
        for a in emulator {
            assert!(addr(a).is_valid(ChainId::Emulator), "{a} on emulator");
            assert!(!addr(a).is_valid(ChainId::Mainnet), "{a} on mainnet");
            assert!(!addr(a).is_valid(ChainId::Testnet), "{a} on testnet");
        }
    }

    #[test]
    fn test_codeword_itself_is_invalid() {
        assert!(!Address::EMPTY.is_valid(ChainId::Mainnet));
        assert!(!Address::from_u64(ChainId::Testnet.codeword()).is_valid(ChainId::Testnet));
        assert!(!addr("0x1").is_valid(ChainId::Mainnet));
    }

    #[test]
    fn test_chain_from_network_name() {
        assert_eq!(ChainId::from_network_name("emulator"), Some(ChainId::Emulator));
        assert_eq!(ChainId::from_network_name("testing"), Some(ChainId::Emulator));
        assert_eq!(ChainId::from_network_name("previewnet"), Some(ChainId::Testnet));
        assert_eq!(ChainId::from_network_name("mainnet"), Some(ChainId::Mainnet));
        assert_eq!(ChainId::from_network_name("my-local-fork"), None);
        assert_eq!("flow-testnet".parse::<ChainId>(), Ok(ChainId::Testnet));
    }

    #[test]
    fn test_serde_roundtrip() {
        let a = addr("0x179b6b1cb6755e31");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"179b6b1cb6755e31\"");
        let back: Address = serde_json::from_str("\"0x179b6b1cb6755e31\"").unwrap();
        assert_eq!(back, a);
    }
}
