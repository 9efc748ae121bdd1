//! Minter role synchronisation core.
//!
//! - [`NonceAllocator`]: the one piece of shared mutable state (next nonce of
//!   the signing account), seeded and periodically resynced from the chain.
//! - [`RoleSyncEngine`]: realises a single grant/revoke as a mined transaction,
//!   absorbing nonce contention.
//! - [`ReconciliationDriver`]: batch-bounded convergence of the registry with
//!   on-chain role membership, plus fetch/seed helpers.
//!
//! IO lives behind [`ChainClient`] and [`MinterRegistry`]; this crate has no
//! network or database code of its own.

mod chain;
mod driver;
mod engine;
mod error;
mod nonce;
mod registry;
mod report;

pub use chain::{ChainClient, ChainError};
pub use driver::{fetch_role_members, ReconciliationDriver, DEFAULT_BATCH_SIZE, FETCH_CONCURRENCY};
pub use engine::{RoleSyncEngine, SyncOutcome};
pub use error::{DriverError, SyncError};
pub use nonce::{
    NonceAllocator, ResyncPolicy, ResyncTask, DEFAULT_RESYNC_INTERVAL, DEFAULT_RESYNC_RETRY_DELAY,
};
pub use registry::MinterRegistry;
pub use report::{BatchSummary, ChangedMinter, FailedMinter, SyncReport};
