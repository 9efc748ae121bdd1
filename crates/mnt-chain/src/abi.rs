//! Minimal ABI encoding for the minter access-control contract.
//!
//! Only static argument types appear (`address`, `bytes32`, `uint256`), so
//! every call is a 4-byte selector followed by 32-byte words.

use mnt_schemas::Address;
use primitive_types::U256;
use sha3::{Digest, Keccak256};

pub const SET_MINTER: &str = "setMinter(address)";
pub const REMOVE_MINTER: &str = "removeMinter(address)";
pub const HAS_ROLE: &str = "hasRole(bytes32,address)";
pub const GET_ROLE_MEMBER_COUNT: &str = "getRoleMemberCount(bytes32)";
pub const GET_ROLE_MEMBER: &str = "getRoleMember(bytes32,uint256)";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// `keccak256("MINTER_ROLE")`.
pub fn minter_role() -> [u8; 32] {
    keccak256(b"MINTER_ROLE")
}

pub fn selector(signature: &str) -> [u8; 4] {
    let h = keccak256(signature.as_bytes());
    [h[0], h[1], h[2], h[3]]
}

pub fn address_word(a: &Address) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[12..].copy_from_slice(a.as_bytes());
    w
}

pub fn uint_word(v: u64) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[24..].copy_from_slice(&v.to_be_bytes());
    w
}

pub fn encode_call(signature: &str, words: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 * words.len());
    out.extend_from_slice(&selector(signature));
    for w in words {
        out.extend_from_slice(w);
    }
    out
}

pub fn set_minter(a: &Address) -> Vec<u8> {
    encode_call(SET_MINTER, &[address_word(a)])
}

pub fn remove_minter(a: &Address) -> Vec<u8> {
    encode_call(REMOVE_MINTER, &[address_word(a)])
}

pub fn has_role(a: &Address) -> Vec<u8> {
    encode_call(HAS_ROLE, &[minter_role(), address_word(a)])
}

pub fn get_role_member_count() -> Vec<u8> {
    encode_call(GET_ROLE_MEMBER_COUNT, &[minter_role()])
}

pub fn get_role_member(index: u64) -> Vec<u8> {
    encode_call(GET_ROLE_MEMBER, &[minter_role(), uint_word(index)])
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiDecodeError {
    #[error("expected a 32-byte word, got {0} bytes")]
    Length(usize),
    #[error("bool word has non-canonical value")]
    NotBool,
    #[error("uint256 does not fit in u64")]
    Overflow,
    #[error("address word has non-zero padding")]
    NotAddress,
}

fn first_word(ret: &[u8]) -> Result<[u8; 32], AbiDecodeError> {
    if ret.len() < 32 {
        return Err(AbiDecodeError::Length(ret.len()));
    }
    let mut w = [0u8; 32];
    w.copy_from_slice(&ret[..32]);
    Ok(w)
}

pub fn decode_bool(ret: &[u8]) -> Result<bool, AbiDecodeError> {
    let w = first_word(ret)?;
    if w[..31].iter().any(|b| *b != 0) {
        return Err(AbiDecodeError::NotBool);
    }
    match w[31] {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(AbiDecodeError::NotBool),
    }
}

pub fn decode_u64(ret: &[u8]) -> Result<u64, AbiDecodeError> {
    let v = U256::from_big_endian(&first_word(ret)?);
    if v > U256::from(u64::MAX) {
        return Err(AbiDecodeError::Overflow);
    }
    Ok(v.as_u64())
}

pub fn decode_address(ret: &[u8]) -> Result<Address, AbiDecodeError> {
    let w = first_word(ret)?;
    if w[..12].iter().any(|b| *b != 0) {
        return Err(AbiDecodeError::NotAddress);
    }
    Ok(Address::from_word(&w))
}
