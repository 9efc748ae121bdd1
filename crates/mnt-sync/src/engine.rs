//! Role-sync engine: realises one [`RoleChangeRequest`] as a mined, successful
//! transaction.
//!
//! # Per-request state machine
//!
//! ```text
//! Pending --submit--> Submitted --receipt ok--> MinedSuccess
//!    ^                    |   \--receipt failed--> MinedFailed   (terminal)
//!    |                    \--other error-------> SubmissionError (terminal)
//!    \---nonce contention-/
//! ```
//!
//! # Ordering per request
//! allocate -> submit -> advance. The allocator is told a nonce is consumed as
//! soon as the node accepts the transaction, so sibling requests can pick the
//! next nonce without waiting for this one to be mined.
//!
//! Nonce contention is retried without limit: it is the expected outcome when
//! several requests race for the same sequence number.

use std::sync::Arc;
use std::time::Duration;

use mnt_schemas::{Address, MinterRecord, Receipt, RoleChangeRequest, RoleIntent};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::error::SyncError;
use crate::nonce::NonceAllocator;

/// Result of [`RoleSyncEngine::sync_one`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// On-chain membership already matched the record; nothing was sent.
    Unchanged,
    Changed { intent: RoleIntent, receipt: Receipt },
}

pub struct RoleSyncEngine {
    chain: Arc<dyn ChainClient>,
    nonces: Arc<NonceAllocator>,
    mined_timeout: Option<Duration>,
}

impl RoleSyncEngine {
    pub fn new(chain: Arc<dyn ChainClient>, nonces: Arc<NonceAllocator>) -> Self {
        Self {
            chain,
            nonces,
            mined_timeout: None,
        }
    }

    /// Bound the wait for a receipt. On expiry the request fails with
    /// [`SyncError::StillPending`] instead of blocking indefinitely.
    pub fn with_mined_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.mined_timeout = timeout;
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn nonces(&self) -> &Arc<NonceAllocator> {
        &self.nonces
    }

    pub async fn grant(&self, address: Address) -> Result<Receipt, SyncError> {
        self.submit(RoleChangeRequest::grant(address)).await
    }

    pub async fn revoke(&self, address: Address) -> Result<Receipt, SyncError> {
        self.submit(RoleChangeRequest::revoke(address)).await
    }

    /// Compare `record` with on-chain membership and return the change needed,
    /// if any.
    pub async fn plan(&self, record: &MinterRecord) -> Result<Option<RoleChangeRequest>, SyncError> {
        let has_role = self
            .chain
            .has_role(record.address)
            .await
            .map_err(|source| SyncError::RoleCheck {
                address: record.address,
                source,
            })?;
        Ok(RoleIntent::for_status(record.status, has_role).map(|intent| RoleChangeRequest {
            address: record.address,
            intent,
        }))
    }

    /// Bring one address in line with its registry record.
    ///
    /// Issues no transaction when membership already matches.
    pub async fn sync_one(&self, record: &MinterRecord) -> Result<SyncOutcome, SyncError> {
        match self.plan(record).await? {
            None => {
                debug!(address = %record.address, status = record.status.as_str(), "already in sync");
                Ok(SyncOutcome::Unchanged)
            }
            Some(req) => {
                let receipt = self.submit(req).await?;
                Ok(SyncOutcome::Changed {
                    intent: req.intent,
                    receipt,
                })
            }
        }
    }

    /// Submit `req`, absorbing nonce contention, and wait for a successful receipt.
    pub async fn submit(&self, req: RoleChangeRequest) -> Result<Receipt, SyncError> {
        let (nonce, tx_hash) = loop {
            let nonce = self.nonces.current();
            match self.chain.send_role_change(&req, nonce).await {
                Ok(tx_hash) => break (nonce, tx_hash),
                Err(err) if err.is_nonce_contention() => {
                    self.nonces.advance(nonce);
                    // Jump past nonces consumed outside this process in one step.
                    let next = match self.nonces.catch_up().await {
                        Ok(next) => next,
                        Err(read_err) => {
                            debug!(error = %read_err, "pending nonce read failed; stepping by one");
                            self.nonces.current()
                        }
                    };
                    debug!(
                        address = %req.address,
                        intent = req.intent.as_str(),
                        nonce,
                        next,
                        error = %err,
                        "nonce contention; retrying with next nonce"
                    );
                }
                Err(source) => {
                    warn!(
                        address = %req.address,
                        intent = req.intent.as_str(),
                        nonce,
                        error = %source,
                        "role change submission rejected"
                    );
                    return Err(SyncError::Submission {
                        address: req.address,
                        intent: req.intent,
                        source,
                    });
                }
            }
        };

        // Accepted into the pool: the nonce is consumed whatever happens next.
        self.nonces.advance(nonce);
        debug!(address = %req.address, intent = req.intent.as_str(), nonce, %tx_hash, "submitted");

        let receipt = self.wait_mined(tx_hash).await?;
        if !receipt.is_success() {
            warn!(address = %req.address, intent = req.intent.as_str(), nonce, %tx_hash, "reverted on chain");
            return Err(SyncError::Reverted {
                address: req.address,
                intent: req.intent,
                tx_hash,
            });
        }

        self.nonces.advance(nonce);
        info!(
            address = %req.address,
            intent = req.intent.as_str(),
            nonce,
            %tx_hash,
            block = ?receipt.block_number,
            "role change mined"
        );
        Ok(receipt)
    }

    async fn wait_mined(&self, tx_hash: mnt_schemas::TxHash) -> Result<Receipt, SyncError> {
        let wait = self.chain.wait_mined(tx_hash);
        let res = match self.mined_timeout {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(SyncError::StillPending {
                        tx_hash,
                        waited_secs: limit.as_secs(),
                    })
                }
            },
        };
        res.map_err(|source| match source {
            ChainError::Timeout(_) => SyncError::StillPending {
                tx_hash,
                waited_secs: self.mined_timeout.map(|d| d.as_secs()).unwrap_or(0),
            },
            source => SyncError::Wait { tx_hash, source },
        })
    }
}

impl std::fmt::Debug for RoleSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleSyncEngine")
            .field("signer", &self.chain.signer())
            .field("nonces", &self.nonces)
            .field("mined_timeout", &self.mined_timeout)
            .finish()
    }
}
