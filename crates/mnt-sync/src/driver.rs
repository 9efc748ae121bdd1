//! Reconciliation driver: converges the registry's desired state with on-chain
//! role membership.
//!
//! # Invariants
//! - Batches run sequentially; every request of batch N finishes (success or
//!   failure) before batch N+1 is planned. At most `batch_size` role changes are
//!   in flight at once.
//! - A per-request failure never aborts the batch or the run.
//! - Registry writes happen only after the on-chain change is mined
//!   successfully.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use mnt_schemas::{Address, MinterRecord, Receipt, RoleChangeRequest};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::engine::RoleSyncEngine;
use crate::error::DriverError;
use crate::registry::MinterRegistry;
use crate::report::{BatchSummary, ChangedMinter, FailedMinter, SyncReport};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Concurrency limit for role-member index reads in
/// [`ReconciliationDriver::fetch_on_chain_minters`].
pub const FETCH_CONCURRENCY: usize = 50;

pub struct ReconciliationDriver {
    registry: Arc<dyn MinterRegistry>,
    engine: Arc<RoleSyncEngine>,
}

impl ReconciliationDriver {
    pub fn new(registry: Arc<dyn MinterRegistry>, engine: Arc<RoleSyncEngine>) -> Self {
        Self { registry, engine }
    }

    pub fn engine(&self) -> &Arc<RoleSyncEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<dyn MinterRegistry> {
        &self.registry
    }

    /// Grant on chain, then record the address as active.
    pub async fn grant_minter(&self, address: Address) -> Result<Receipt, DriverError> {
        let req = RoleChangeRequest::grant(address);
        apply_change(&self.engine, &self.registry, req).await
    }

    /// Revoke on chain, then record the address as archived.
    pub async fn revoke_minter(&self, address: Address) -> Result<Receipt, DriverError> {
        let req = RoleChangeRequest::revoke(address);
        apply_change(&self.engine, &self.registry, req).await
    }

    /// Run one full reconciliation pass.
    ///
    /// Returns `Err` only when the pass could not start (bad batch size,
    /// registry unreadable). Per-address failures are collected in the report;
    /// use [`SyncReport::into_result`] to treat them as an error.
    pub async fn sync_all(&self, batch_size: usize) -> Result<SyncReport, DriverError> {
        if batch_size == 0 {
            return Err(DriverError::InvalidBatchSize);
        }
        let records = self.registry.list_all().await.map_err(DriverError::Registry)?;
        let mut report = SyncReport::begin(batch_size, records.len());
        info!(records = records.len(), batch_size, "reconciliation started");

        for (index, batch) in records.chunks(batch_size).enumerate() {
            let summary = self.run_batch(index, batch, &mut report).await;
            info!(
                batch = index,
                size = summary.size,
                dispatched = summary.dispatched,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "batch finished"
            );
            report.batches.push(summary);
        }

        let report = report.finish();
        if report.is_clean() {
            info!(
                changed = report.changed.len(),
                unchanged = report.unchanged,
                "reconciliation finished"
            );
        } else {
            warn!(
                changed = report.changed.len(),
                unchanged = report.unchanged,
                failed = report.failed.len(),
                "reconciliation finished with failures"
            );
        }
        Ok(report)
    }

    async fn run_batch(
        &self,
        index: usize,
        batch: &[MinterRecord],
        report: &mut SyncReport,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            index,
            size: batch.len(),
            dispatched: 0,
            succeeded: 0,
            failed: 0,
        };

        // Role checks for the whole batch, concurrently.
        let plans = futures_util::future::join_all(batch.iter().map(|r| self.engine.plan(r))).await;

        let mut to_dispatch = Vec::new();
        for (record, plan) in batch.iter().zip(plans) {
            match plan {
                Ok(Some(req)) => to_dispatch.push(req),
                Ok(None) => report.unchanged += 1,
                Err(err) => {
                    error!(batch = index, address = %record.address, error = %err, "role check failed");
                    summary.failed += 1;
                    report.failed.push(FailedMinter {
                        address: record.address,
                        intent: None,
                        error: err.to_string(),
                    });
                }
            }
        }

        summary.dispatched = to_dispatch.len();
        debug!(batch = index, dispatched = summary.dispatched, "dispatching role changes");

        // Owned by this future: dropping the pass aborts the batch instead of
        // leaving detached role changes behind.
        let mut tasks = JoinSet::new();
        for (slot, req) in to_dispatch.iter().copied().enumerate() {
            let engine = Arc::clone(&self.engine);
            let registry = Arc::clone(&self.registry);
            tasks.spawn(async move { (slot, apply_change(&engine, &registry, req).await) });
        }

        // Barrier: wait for every dispatched change before returning.
        let mut results: Vec<Option<Result<Receipt, String>>> = vec![None; to_dispatch.len()];
        let mut lost = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, res)) => results[slot] = Some(res.map_err(|e| format!("{e:#}"))),
                Err(join) => lost.push(format!("task failed: {join}")),
            }
        }
        let mut lost = lost.into_iter();

        for (req, res) in to_dispatch.into_iter().zip(results) {
            let res = res.unwrap_or_else(|| {
                Err(lost.next().unwrap_or_else(|| "task failed".to_string()))
            });
            match res {
                Ok(receipt) => {
                    summary.succeeded += 1;
                    report.changed.push(ChangedMinter {
                        address: req.address,
                        intent: req.intent,
                        tx_hash: receipt.tx_hash,
                    });
                }
                Err(msg) => {
                    error!(
                        batch = index,
                        address = %req.address,
                        intent = req.intent.as_str(),
                        error = %msg,
                        "role change failed"
                    );
                    summary.failed += 1;
                    report.failed.push(FailedMinter {
                        address: req.address,
                        intent: Some(req.intent),
                        error: msg,
                    });
                }
            }
        }
        summary
    }

    /// Enumerate current on-chain role members. See [`fetch_role_members`].
    pub async fn fetch_on_chain_minters(&self) -> Result<Vec<Address>, DriverError> {
        Ok(fetch_role_members(self.engine.chain().as_ref()).await?)
    }

    /// Replace the registry with the current on-chain members, all active.
    ///
    /// Refuses to touch the registry unless every member index was read.
    /// Returns the number of rows written.
    pub async fn seed_registry_from_chain(&self) -> Result<usize, DriverError> {
        let (expected, members) = read_role_members(self.engine.chain().as_ref()).await?;
        if members.len() as u64 != expected {
            warn!(expected, read = members.len(), "incomplete member read; registry not replaced");
            return Err(DriverError::PartialMemberRead {
                expected,
                read: members.len(),
            });
        }
        let records: Vec<MinterRecord> = members.into_iter().map(MinterRecord::active).collect();
        self.registry
            .truncate_and_bulk_insert(&records)
            .await
            .map_err(DriverError::Registry)?;
        info!(rows = records.len(), "registry seeded from chain");
        Ok(records.len())
    }
}

/// Enumerate current on-chain role members, sorted and de-duplicated.
///
/// Index reads run concurrently; an index that cannot be read is logged and
/// skipped. Only the member count read is fatal.
pub async fn fetch_role_members(chain: &dyn ChainClient) -> Result<Vec<Address>, ChainError> {
    Ok(read_role_members(chain).await?.1)
}

/// Member count as reported by the contract, plus the members actually read.
async fn read_role_members(chain: &dyn ChainClient) -> Result<(u64, Vec<Address>), ChainError> {
    let count = chain.role_member_count().await?;
    debug!(count, "reading role members");

    let results: Vec<_> = stream::iter(0..count)
        .map(|i| async move { (i, chain.role_member(i).await) })
        .buffer_unordered(FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut members = Vec::with_capacity(results.len());
    for (i, res) in results {
        match res {
            Ok(a) => members.push(a),
            Err(err) => warn!(index = i, error = %err, "failed to read role member; skipping"),
        }
    }
    members.sort();
    members.dedup();
    Ok((count, members))
}

/// Realise `req` on chain and, once mined, write the resulting status.
async fn apply_change(
    engine: &RoleSyncEngine,
    registry: &Arc<dyn MinterRegistry>,
    req: RoleChangeRequest,
) -> Result<Receipt, DriverError> {
    let receipt = engine.submit(req).await?;
    registry
        .upsert(req.address, req.intent.resulting_status())
        .await
        .map_err(|cause| DriverError::RegistryBehindChain {
            address: req.address,
            tx_hash: receipt.tx_hash,
            cause,
        })?;
    Ok(receipt)
}

