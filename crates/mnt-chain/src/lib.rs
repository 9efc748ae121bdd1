//! JSON-RPC chain adapter for the minter access-control contract.
//!
//! Implements [`mnt_sync::ChainClient`]: local secp256k1 signing of legacy
//! EIP-155 transactions, `eth_call` reads of role membership and receipt
//! polling. Node errors are classified into [`mnt_sync::ChainError`] here and
//! nowhere else.

pub mod abi;
mod client;
mod rpc;
mod signer;
mod tx;

pub use client::{
    RpcChainClient, RpcClientConfig, DEFAULT_GAS_LIMIT, DEFAULT_RECEIPT_POLL,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use rpc::classify;
pub use signer::{RecoverableSignature, Signer, SignerError};
pub use tx::{LegacyTx, SignedTx};
