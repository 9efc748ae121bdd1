//! Shared domain types for minter role management.
//!
//! Pure data. No IO, no async.

use std::fmt;

use serde::{Deserialize, Serialize};

mod address;

pub use address::{Address, AddressParseError};

// ---------------------------------------------------------------------------
// MinterStatus / MinterRecord
// ---------------------------------------------------------------------------

/// Desired on-chain state for a registry entry.
///
/// `Active` means the address is expected to hold the minter role,
/// `Archived` means it is expected not to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinterStatus {
    Active,
    Archived,
}

impl MinterStatus {
    /// Registry storage encoding.
    pub fn as_i16(&self) -> i16 {
        match self {
            MinterStatus::Active => 1,
            MinterStatus::Archived => 0,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(MinterStatus::Active),
            0 => Some(MinterStatus::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MinterStatus::Active => "ACTIVE",
            MinterStatus::Archived => "ARCHIVED",
        }
    }
}

/// One row of the off-chain registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinterRecord {
    pub address: Address,
    pub status: MinterStatus,
}

impl MinterRecord {
    pub fn new(address: Address, status: MinterStatus) -> Self {
        Self { address, status }
    }

    pub fn active(address: Address) -> Self {
        Self::new(address, MinterStatus::Active)
    }

    pub fn archived(address: Address) -> Self {
        Self::new(address, MinterStatus::Archived)
    }
}

// ---------------------------------------------------------------------------
// RoleIntent / RoleChangeRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleIntent {
    Grant,
    Revoke,
}

impl RoleIntent {
    /// Decision table for one registry record against observed role membership:
    ///
    /// | status   | has_role | intent  |
    /// |----------|----------|---------|
    /// | Active   | false    | Grant   |
    /// | Archived | true     | Revoke  |
    /// | _        | _        | none    |
    pub fn for_status(status: MinterStatus, has_role: bool) -> Option<RoleIntent> {
        match (status, has_role) {
            (MinterStatus::Active, false) => Some(RoleIntent::Grant),
            (MinterStatus::Archived, true) => Some(RoleIntent::Revoke),
            _ => None,
        }
    }

    /// Registry status to record once this intent is confirmed on chain.
    pub fn resulting_status(&self) -> MinterStatus {
        match self {
            RoleIntent::Grant => MinterStatus::Active,
            RoleIntent::Revoke => MinterStatus::Archived,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleIntent::Grant => "grant",
            RoleIntent::Revoke => "revoke",
        }
    }
}

/// A single grant or revoke to realise on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleChangeRequest {
    pub address: Address,
    pub intent: RoleIntent,
}

impl RoleChangeRequest {
    pub fn grant(address: Address) -> Self {
        Self {
            address,
            intent: RoleIntent::Grant,
        }
    }

    pub fn revoke(address: Address) -> Self {
        Self {
            address,
            intent: RoleIntent::Revoke,
        }
    }
}

// ---------------------------------------------------------------------------
// TxHash / Receipt
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out).ok()?;
        Some(Self(out))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl Serialize for TxHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::parse_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid tx hash"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    /// Mined, but the call reverted.
    Failed,
}

/// Inclusion receipt for a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        use MinterStatus::*;
        assert_eq!(RoleIntent::for_status(Active, false), Some(RoleIntent::Grant));
        assert_eq!(RoleIntent::for_status(Active, true), None);
        assert_eq!(RoleIntent::for_status(Archived, true), Some(RoleIntent::Revoke));
        assert_eq!(RoleIntent::for_status(Archived, false), None);
    }

    #[test]
    fn status_storage_encoding() {
        assert_eq!(MinterStatus::Active.as_i16(), 1);
        assert_eq!(MinterStatus::Archived.as_i16(), 0);
        assert_eq!(MinterStatus::from_i16(1), Some(MinterStatus::Active));
        assert_eq!(MinterStatus::from_i16(0), Some(MinterStatus::Archived));
        assert_eq!(MinterStatus::from_i16(7), None);
    }

    #[test]
    fn intent_maps_back_to_status() {
        assert_eq!(RoleIntent::Grant.resulting_status(), MinterStatus::Active);
        assert_eq!(RoleIntent::Revoke.resulting_status(), MinterStatus::Archived);
    }

    #[test]
    fn tx_hash_display_and_parse() {
        let h = TxHash([0xab; 32]);
        let s = h.to_string();
        assert!(s.starts_with("0xabab"));
        assert_eq!(s.len(), 66);
        assert_eq!(TxHash::parse_hex(&s), Some(h));
        assert_eq!(TxHash::parse_hex("0x12"), None);
    }
}
