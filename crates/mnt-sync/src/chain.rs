//! Chain client boundary.
//!
//! The core never talks JSON-RPC directly; it consumes a [`ChainClient`]
//! implementation (the RPC adapter in `mnt-chain`, or the in-memory mock in
//! `mnt-testkit`). Error classification happens inside the adapter: the core
//! only ever matches on [`ChainError`] variants.

use async_trait::async_trait;
use mnt_schemas::{Address, Receipt, RoleChangeRequest, TxHash};

/// Errors surfaced by a [`ChainClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The submitted nonce is already occupied by another transaction from
    /// the same sender (replace-by-fee rejection) or already consumed.
    #[error("nonce contention: {0}")]
    NonceContention(String),

    /// The node refused the transaction or call for any other reason.
    #[error("rejected by node (code={code:?}): {message}")]
    Rejected { code: Option<i64>, message: String },

    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The node did not produce a result in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ChainError {
    pub fn is_nonce_contention(&self) -> bool {
        matches!(self, ChainError::NonceContention(_))
    }
}

/// Operations the core needs from the ledger.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// concurrently running request through an `Arc<dyn ChainClient>`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The single signing identity every write transaction is sent from.
    fn signer(&self) -> Address;

    /// Next nonce for `account`, counting transactions still in the pool.
    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError>;

    /// Whether `account` currently holds the minter role.
    async fn has_role(&self, account: Address) -> Result<bool, ChainError>;

    /// Number of current minter role members.
    async fn role_member_count(&self) -> Result<u64, ChainError>;

    /// Role member at `index` (`0..role_member_count()`).
    async fn role_member(&self, index: u64) -> Result<Address, ChainError>;

    /// Sign and submit the grant/revoke call for `request` using exactly `nonce`.
    async fn send_role_change(
        &self,
        request: &RoleChangeRequest,
        nonce: u64,
    ) -> Result<TxHash, ChainError>;

    /// Block until `tx` is mined and return its receipt.
    async fn wait_mined(&self, tx: TxHash) -> Result<Receipt, ChainError>;
}
