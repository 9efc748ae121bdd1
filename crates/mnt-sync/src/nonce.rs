//! Nonce allocator for the single signing account.
//!
//! # Invariants
//! - The counter is the only shared, frequently mutated state in the core.
//!   It is mutated here and nowhere else.
//! - The lock is held for one read or one update, never across an `.await`.
//! - The chain is the only authoritative source: the counter is seeded from
//!   `pending_nonce` at start and periodically overwritten by [`NonceAllocator::resync`].
//!   Nothing is persisted.
//! - [`NonceAllocator::advance`] only moves the counter forward past a nonce that has
//!   been consumed, so reporting the same consumed nonce twice is harmless.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mnt_schemas::Address;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ChainError};

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESYNC_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Timing for the background resync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncPolicy {
    /// Delay between successful resyncs.
    pub interval: Duration,
    /// Delay before retrying a failed resync.
    pub retry_delay: Duration,
}

impl Default for ResyncPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RESYNC_INTERVAL,
            retry_delay: DEFAULT_RESYNC_RETRY_DELAY,
        }
    }
}

pub struct NonceAllocator {
    chain: Arc<dyn ChainClient>,
    account: Address,
    next: Mutex<u64>,
}

impl NonceAllocator {
    /// Seed the counter from the chain's pending nonce for the client's signer.
    ///
    /// Failure here is fatal for the caller: no request can be nonced
    /// correctly without an initial read.
    pub async fn start(chain: Arc<dyn ChainClient>) -> Result<Arc<Self>, ChainError> {
        let account = chain.signer();
        let next = chain.pending_nonce(account).await?;
        info!(%account, nonce = next, "nonce allocator seeded from chain");
        Ok(Arc::new(Self {
            chain,
            account,
            next: Mutex::new(next),
        }))
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Next nonce to use. Does not advance.
    pub fn current(&self) -> u64 {
        *self.lock()
    }

    /// Record that `consumed` is taken; the counter becomes at least `consumed + 1`.
    ///
    /// Returns the counter after the update.
    pub fn advance(&self, consumed: u64) -> u64 {
        let mut next = self.lock();
        if consumed >= *next {
            *next = consumed.saturating_add(1);
        }
        *next
    }

    /// Overwrite the counter with the chain's current pending nonce.
    ///
    /// The network read happens before the lock is taken. On failure the
    /// counter is left untouched and keeps serving its last value.
    pub async fn resync(&self) -> Result<u64, ChainError> {
        let fresh = self.chain.pending_nonce(self.account).await?;
        let prev = std::mem::replace(&mut *self.lock(), fresh);
        if prev != fresh {
            info!(account = %self.account, prev, fresh, "nonce resynced from chain");
        } else {
            debug!(account = %self.account, nonce = fresh, "nonce resync: unchanged");
        }
        Ok(fresh)
    }

    /// Out-of-band resync after a nonce conflict: read the chain's pending
    /// nonce and move the counter forward to it. Never moves the counter back,
    /// so it cannot hand out a nonce a sibling request has already used.
    pub async fn catch_up(&self) -> Result<u64, ChainError> {
        let fresh = self.chain.pending_nonce(self.account).await?;
        let mut next = self.lock();
        if fresh > *next {
            info!(account = %self.account, prev = *next, fresh, "nonce caught up with chain");
            *next = fresh;
        }
        Ok(*next)
    }

    /// Run [`NonceAllocator::resync`] on `policy.interval` until the returned handle is
    /// shut down or dropped. Failures are logged and retried after
    /// `policy.retry_delay`; the task never exits on its own.
    pub fn spawn_resync(self: &Arc<Self>, policy: ResyncPolicy) -> ResyncTask {
        let allocator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let wait = match allocator.resync().await {
                    Ok(_) => policy.interval,
                    Err(err) => {
                        warn!(
                            account = %allocator.account,
                            error = %err,
                            retry_in_secs = policy.retry_delay.as_secs_f64(),
                            "nonce resync failed; serving last known value"
                        );
                        policy.retry_delay
                    }
                };
                tokio::time::sleep(wait).await;
            }
        });
        ResyncTask {
            handle: Some(handle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // A poisoned counter is still a valid integer.
        self.next.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for NonceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceAllocator")
            .field("account", &self.account)
            .field("next", &self.current())
            .finish()
    }
}

/// Handle to the background resync task. Dropping it stops the task.
#[derive(Debug)]
pub struct ResyncTask {
    handle: Option<JoinHandle<()>>,
}

impl ResyncTask {
    pub fn shutdown(mut self) {
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

impl Drop for ResyncTask {
    fn drop(&mut self) {
        self.stop();
    }
}
