//! Test doubles for the minter sync core: a nonce-faithful in-memory chain and
//! an in-memory registry, plus helpers to wire them into a driver.

use std::sync::Arc;
use std::time::Duration;

use mnt_schemas::Address;
use mnt_sync::{NonceAllocator, ReconciliationDriver, RoleSyncEngine};

mod memory_registry;
mod mock_chain;

pub use memory_registry::MemoryRegistry;
pub use mock_chain::{MockChain, MOCK_SIGNER, REPLACEMENT_UNDERPRICED};

/// Deterministic, distinct test address derived from `n`.
pub fn addr(n: u32) -> Address {
    let mut b = [0u8; 20];
    b[0] = 0xa0;
    b[16..].copy_from_slice(&n.to_be_bytes());
    Address::from_bytes(b)
}

/// Engine over `chain` with a freshly seeded allocator.
pub async fn engine_for(chain: Arc<MockChain>, mined_timeout: Option<Duration>) -> Arc<RoleSyncEngine> {
    let nonces = match NonceAllocator::start(chain.clone()).await {
        Ok(n) => n,
        Err(e) => panic!("mock chain refused initial nonce read: {e}"),
    };
    Arc::new(RoleSyncEngine::new(chain, nonces).with_mined_timeout(mined_timeout))
}

/// Driver over `chain` and `registry` with a freshly seeded allocator.
pub async fn driver_for(chain: Arc<MockChain>, registry: Arc<MemoryRegistry>) -> ReconciliationDriver {
    let engine = engine_for(chain, None).await;
    ReconciliationDriver::new(registry, engine)
}
