//! Legacy (type 0) transactions with EIP-155 replay protection.

use mnt_schemas::{Address, TxHash};
use primitive_types::U256;
use rlp::RlpStream;

use crate::abi::keccak256;
use crate::signer::{Signer, SignerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// RLP bytes ready for `eth_sendRawTransaction`, plus their hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

impl SignedTx {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

impl LegacyTx {
    fn append_body(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        s.append(&self.to.as_bytes().to_vec());
        s.append(&self.value);
        s.append(&self.data);
    }

    /// keccak256(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])).
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut s = RlpStream::new_list(9);
        self.append_body(&mut s);
        s.append(&self.chain_id);
        s.append(&0u8);
        s.append(&0u8);
        keccak256(&s.out())
    }

    pub fn sign(&self, signer: &Signer) -> Result<SignedTx, SignerError> {
        let sig = signer.sign_digest(&self.signing_hash())?;
        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(sig.recovery_id)))
            .ok_or(SignerError::ChainIdTooLarge(self.chain_id))?;

        let mut s = RlpStream::new_list(9);
        self.append_body(&mut s);
        s.append(&v);
        s.append(&U256::from_big_endian(&sig.r));
        s.append(&U256::from_big_endian(&sig.s));
        let raw = s.out().to_vec();
        let hash = TxHash(keccak256(&raw));
        Ok(SignedTx { raw, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The worked example from EIP-155.
    fn eip155_example() -> LegacyTx {
        LegacyTx {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: Address::from_bytes([0x35; 20]),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn signing_hash_matches_eip155_example() {
        assert_eq!(
            hex::encode(eip155_example().signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signed_bytes_match_eip155_example() {
        let signer = Signer::from_hex(&"46".repeat(32)).unwrap();
        let signed = eip155_example().sign(&signer).unwrap();
        assert_eq!(
            signed.raw_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(signed.hash, TxHash(keccak256(&signed.raw)));
    }

    #[test]
    fn oversized_chain_id_is_an_error() {
        let signer = Signer::from_hex(&"46".repeat(32)).unwrap();
        for chain_id in [u64::MAX, u64::MAX / 2] {
            let tx = LegacyTx {
                chain_id,
                ..eip155_example()
            };
            assert_eq!(tx.sign(&signer), Err(SignerError::ChainIdTooLarge(chain_id)));
        }
    }
}
