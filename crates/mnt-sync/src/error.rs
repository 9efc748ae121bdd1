use mnt_schemas::{Address, RoleIntent, TxHash};

use crate::chain::ChainError;

/// Terminal (or retry-later) failure of a single role change.
///
/// Nonce contention never appears here: the engine absorbs it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Reading on-chain role membership failed.
    #[error("failed to check minter role for {address}: {source}")]
    RoleCheck { address: Address, source: ChainError },

    /// The node refused the transaction for a reason other than nonce contention.
    #[error("failed to {} role for {address}: {source}", .intent.as_str())]
    Submission {
        address: Address,
        intent: RoleIntent,
        source: ChainError,
    },

    /// The transaction was accepted but waiting for its receipt failed.
    #[error("failed to wait for {tx_hash} to be mined: {source}")]
    Wait { tx_hash: TxHash, source: ChainError },

    /// The wait deadline passed before the transaction was mined. The nonce is
    /// consumed; retrying later is safe.
    #[error("transaction {tx_hash} still pending after {waited_secs}s")]
    StillPending { tx_hash: TxHash, waited_secs: u64 },

    /// Mined, but the contract call reverted. The nonce is consumed.
    #[error("transaction {tx_hash} reverted on chain ({} {address})", .intent.as_str())]
    Reverted {
        address: Address,
        intent: RoleIntent,
        tx_hash: TxHash,
    },
}

impl SyncError {
    /// Whether re-running the same request later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::StillPending { .. } => true,
            SyncError::RoleCheck { source, .. } | SyncError::Wait { source, .. } => {
                matches!(source, ChainError::Transport(_) | ChainError::Timeout(_))
            }
            SyncError::Submission { .. } | SyncError::Reverted { .. } => false,
        }
    }
}

/// Failure of a whole reconciliation or registry operation.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("registry error: {0:#}")]
    Registry(anyhow::Error),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The role change is on chain but the registry write afterwards failed.
    #[error("{address} changed on chain ({tx_hash}) but registry write failed: {cause:#}")]
    RegistryBehindChain {
        address: Address,
        tx_hash: TxHash,
        cause: anyhow::Error,
    },

    /// The run finished with some addresses still diverging.
    #[error("reconciliation incomplete: {} address(es) failed: {}", .failed.len(), preview(.failed))]
    Incomplete { failed: Vec<Address> },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// Some role members could not be read; the registry was left as it was.
    #[error("read {read} of {expected} role members; refusing to replace the registry")]
    PartialMemberRead { expected: u64, read: usize },
}

fn preview(addrs: &[Address]) -> String {
    let mut s = addrs
        .iter()
        .take(10)
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if addrs.len() > 10 {
        s.push_str(", ...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let tx = TxHash([1; 32]);
        let a = Address::from_bytes([2; 20]);
        assert!(SyncError::StillPending {
            tx_hash: tx,
            waited_secs: 5
        }
        .is_retryable());
        assert!(!SyncError::Reverted {
            address: a,
            intent: RoleIntent::Grant,
            tx_hash: tx
        }
        .is_retryable());
        assert!(!SyncError::Submission {
            address: a,
            intent: RoleIntent::Revoke,
            source: ChainError::Rejected {
                code: Some(-32000),
                message: "insufficient funds".into()
            }
        }
        .is_retryable());
        assert!(SyncError::Wait {
            tx_hash: tx,
            source: ChainError::Transport("reset".into())
        }
        .is_retryable());
    }

    #[test]
    fn incomplete_lists_failed_addresses() {
        let a = Address::from_bytes([0xaa; 20]);
        let err = DriverError::Incomplete { failed: vec![a] };
        let msg = err.to_string();
        assert!(msg.contains("1 address(es) failed"));
        assert!(msg.contains(&a.to_string()));
    }
}
