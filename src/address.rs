//! Canonical wallet address validation shared by every entry point.

use std::fmt;

use thiserror::Error;

pub const ADDRESS_BYTES: usize = 20;
pub const ADDRESS_HEX_LEN: usize = 2 + ADDRESS_BYTES * 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("This field may not be blank.")]
    Blank,
    #[error("Ensure this field has exactly 42 characters.")]
    Length,
    #[error("Wallet address must start with '0x'")]
    MissingPrefix,
    #[error("Invalid hexadecimal address")]
    InvalidHex,
}

/// A syntactically valid 20-byte account address.
///
/// Checksum casing is not verified; the value always renders in lowercase.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletAddress([u8; ADDRESS_BYTES]);

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Blank);
        }
        if trimmed.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::Length);
        }
        let digits = trimmed
            .strip_prefix("0x")
            .ok_or(AddressError::MissingPrefix)?;

        let mut bytes = [0u8; ADDRESS_BYTES];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub const fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletAddress({self})")
    }
}
