use chrono::{DateTime, Utc};
use mnt_schemas::{Address, RoleIntent, TxHash};
use serde::Serialize;

use crate::error::DriverError;

/// Per-batch counters. `size` is the number of registry records in the batch;
/// `dispatched` the number of role changes it needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub index: usize,
    pub size: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedMinter {
    pub address: Address,
    pub intent: RoleIntent,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMinter {
    pub address: Address,
    /// `None` when the failure happened before a change was decided
    /// (e.g. the role check itself failed).
    pub intent: Option<RoleIntent>,
    pub error: String,
}

/// Outcome of one [`crate::ReconciliationDriver::sync_all`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub batch_size: usize,
    pub total_records: usize,
    pub batches: Vec<BatchSummary>,
    pub changed: Vec<ChangedMinter>,
    pub unchanged: usize,
    pub failed: Vec<FailedMinter>,
}

impl SyncReport {
    pub(crate) fn begin(batch_size: usize, total_records: usize) -> Self {
        let now = Utc::now();
        Self {
            started_at_utc: now,
            finished_at_utc: now,
            batch_size,
            total_records,
            batches: Vec::new(),
            changed: Vec::new(),
            unchanged: 0,
            failed: Vec::new(),
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at_utc = Utc::now();
        self
    }

    /// True when every address converged.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_addresses(&self) -> Vec<Address> {
        self.failed.iter().map(|f| f.address).collect()
    }

    pub fn changed_addresses(&self) -> Vec<Address> {
        self.changed.iter().map(|c| c.address).collect()
    }

    pub fn dispatched(&self) -> usize {
        self.batches.iter().map(|b| b.dispatched).sum()
    }

    /// `Ok(self)` when clean, otherwise [`DriverError::Incomplete`] naming the
    /// failed addresses.
    pub fn into_result(self) -> Result<Self, DriverError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(DriverError::Incomplete {
                failed: self.failed_addresses(),
            })
        }
    }
}
