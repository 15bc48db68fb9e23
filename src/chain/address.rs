//! TON account addresses
//!
//! Supports the raw `workchain:hex` form and the 48-character user-friendly
//! form (tag, workchain, hash, CRC16-XMODEM) in both base64 alphabets.

use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid raw address '{0}'")]
    InvalidRaw(String),

    #[error("invalid user-friendly address '{0}'")]
    InvalidFriendly(String),

    #[error("address checksum mismatch")]
    Checksum,

    #[error("unknown address tag 0x{0:02x}")]
    UnknownTag(u8),
}

/// Standard internal address (`addr_std` without anycast)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub workchain: i8,
    pub hash: [u8; 32],
}

impl Address {
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// `0:83df...` form accepted by every API
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// User-friendly url-safe form
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if testnet {
            tag |= TAG_TESTNET;
        }

        let mut buf = [0u8; 36];
        buf[0] = tag;
        buf[1] = self.workchain as u8;
        buf[2..34].copy_from_slice(&self.hash);
        let crc = crc16(&buf[..34]);
        buf[34..].copy_from_slice(&crc.to_be_bytes());

        general_purpose::URL_SAFE_NO_PAD.encode(buf)
    }

    fn parse_raw(s: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidRaw(s.to_string());
        let (wc, hash_hex) = s.split_once(':').ok_or_else(invalid)?;
        let workchain: i8 = wc.trim().parse().map_err(|_| invalid())?;
        let bytes = hex::decode(hash_hex.trim()).map_err(|_| invalid())?;
        let hash: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Self { workchain, hash })
    }

    fn parse_friendly(s: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidFriendly(s.to_string());
        if s.len() != 48 {
            return Err(invalid());
        }

        let bytes = if s.contains('-') || s.contains('_') {
            general_purpose::URL_SAFE_NO_PAD.decode(s)
        } else {
            general_purpose::STANDARD_NO_PAD.decode(s)
        }
        .map_err(|_| invalid())?;

        if bytes.len() != 36 {
            return Err(invalid());
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16(&bytes[..34]) != expected {
            return Err(AddressError::Checksum);
        }

        let tag = bytes[0] & !TAG_TESTNET;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(AddressError::UnknownTag(bytes[0]));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(Self {
            workchain: bytes[1] as i8,
            hash,
        })
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_friendly(true, false))
    }
}

/// CRC16-XMODEM (poly 0x1021, init 0)
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORACLE: &str = "EQB_C3Jt6Dvgv5hp2B0Beg39BxMPzh9A0aqooq117iSQn3XE";

    #[test]
    fn friendly_roundtrip_preserves_text() {
        let addr: Address = ORACLE.parse().expect("valid address");
        assert_eq!(addr.workchain, 0);
        assert_eq!(addr.to_friendly(true, false), ORACLE);
        assert_eq!(addr.to_string(), ORACLE);
    }

    #[test]
    fn raw_and_friendly_forms_agree() {
        let addr: Address = ORACLE.parse().unwrap();
        let raw: Address = addr.to_raw().parse().unwrap();
        assert_eq!(addr, raw);
        assert!(addr.to_raw().starts_with("0:7f0b726d"));
    }

    #[test]
    fn non_bounceable_form_differs_but_decodes_to_same_account() {
        let addr: Address = ORACLE.parse().unwrap();
        let nb = addr.to_friendly(false, true);
        assert_ne!(nb, ORACLE);
        assert_eq!(nb.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut s = ORACLE.to_string();
        s.replace_range(47..48, "A");
        assert_eq!(s.parse::<Address>(), Err(AddressError::Checksum));
    }

    #[test]
    fn masterchain_raw_address_parses() {
        let raw = format!("-1:{}", "ab".repeat(32));
        let addr: Address = raw.parse().unwrap();
        assert_eq!(addr.workchain, -1);
        assert_eq!(addr.hash, [0xab; 32]);
        assert!("0:abcd".parse::<Address>().is_err());
    }

    #[test]
    fn crc16_xmodem_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31c3);
    }
}
