//! Off-chain minter registry boundary.

use anyhow::Result;
use async_trait::async_trait;
use mnt_schemas::{Address, MinterRecord, MinterStatus};

/// Off-chain store of address -> desired status.
///
/// Implementations provide their own atomicity for single-row writes; the
/// core never wraps several rows in one transaction.
#[async_trait]
pub trait MinterRegistry: Send + Sync {
    async fn list_all(&self) -> Result<Vec<MinterRecord>>;

    /// Insert or update a single address.
    async fn upsert(&self, address: Address, status: MinterStatus) -> Result<()>;

    /// Replace the whole registry with `records`.
    async fn truncate_and_bulk_insert(&self, records: &[MinterRecord]) -> Result<()>;
}
