//! Wallet address normalization.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// A user's wallet address. Always rendered in EIP-55 checksummed form,
/// regardless of the casing it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(Address);

impl WalletAddress {
    /// Wraps a raw address.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self(address)
    }

    /// Returns the underlying address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.0
    }

    /// Returns the checksummed hex form, e.g. `0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed`.
    #[must_use]
    pub fn checksummed(&self) -> String {
        self.0.to_checksum(None)
    }
}

impl FromStr for WalletAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Address::from_str(trimmed)
            .map(Self)
            .map_err(|e| DomainError::Validation(format!("invalid wallet address {trimmed:?}: {e}")))
    }
}

impl From<Address> for WalletAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksummed())
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.checksummed())
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
