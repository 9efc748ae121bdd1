//! The process's single signing identity.

use k256::ecdsa::{RecoveryId, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use mnt_schemas::Address;

use crate::abi::keccak256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("signing key is not valid hex")]
    NotHex,
    #[error("signing key must be 32 bytes, got {0}")]
    Length(usize),
    #[error("signing key is not a valid secp256k1 scalar")]
    InvalidKey,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("chain id {0} is too large for an EIP-155 signature")]
    ChainIdTooLarge(u64),
}

/// Recoverable secp256k1 signature over a 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0 or 1.
    pub recovery_id: u8,
}

pub struct Signer {
    key: SigningKey,
    address: Address,
}

impl Signer {
    /// Decode a hex private key (`0x` prefix optional).
    pub fn from_hex(hex_key: &str) -> Result<Self, SignerError> {
        let trimmed = hex_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|_| SignerError::NotHex)?;
        if bytes.len() != 32 {
            return Err(SignerError::Length(bytes.len()));
        }
        let key = SigningKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::from_key(key))
    }

    pub fn from_key(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        // Uncompressed SEC1: 0x04 || X || Y.
        let digest = keccak256(&point.as_bytes()[1..]);
        Self {
            key,
            address: Address::from_word(&digest),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `digest` as-is (no further hashing), with a low-s signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError> {
        let (mut sig, mut recid) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        if let Some(low) = sig.normalize_s() {
            sig = low;
            recid = RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced());
        }
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recid.to_byte(),
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn derives_address_from_key() {
        let s = Signer::from_hex(KEY).unwrap();
        assert_eq!(
            s.address().to_string(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
        // Bare hex works too.
        let bare = Signer::from_hex(KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(bare.address(), s.address());
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(Signer::from_hex("0xzz").unwrap_err(), SignerError::NotHex);
        assert_eq!(Signer::from_hex("0x1234").unwrap_err(), SignerError::Length(2));
        assert_eq!(
            Signer::from_hex(&"00".repeat(32)).unwrap_err(),
            SignerError::InvalidKey
        );
    }

    #[test]
    fn debug_never_prints_key_material() {
        let s = Signer::from_hex(KEY).unwrap();
        let dbg = format!("{s:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("4c0883a6"));
    }
}
