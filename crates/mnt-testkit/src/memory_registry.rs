//! In-memory [`MinterRegistry`] preserving insertion order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use mnt_schemas::{Address, MinterRecord, MinterStatus};
use mnt_sync::MinterRegistry;

#[derive(Default)]
pub struct MemoryRegistry {
    rows: Mutex<Vec<MinterRecord>>,
    failing_writes: Mutex<HashSet<Address>>,
    list_fails: Mutex<bool>,
    upserts: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I: IntoIterator<Item = MinterRecord>>(records: I) -> Self {
        let r = Self::new();
        *r.rows() = records.into_iter().collect();
        r
    }

    pub fn records(&self) -> Vec<MinterRecord> {
        self.rows().clone()
    }

    pub fn status_of(&self, address: Address) -> Option<MinterStatus> {
        self.rows()
            .iter()
            .find(|r| r.address == address)
            .map(|r| r.status)
    }

    /// Successful `upsert` calls so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn fail_writes_for(&self, address: Address) {
        lock(&self.failing_writes).insert(address);
    }

    pub fn clear_write_failures(&self) {
        lock(&self.failing_writes).clear();
    }

    pub fn set_list_fails(&self, fails: bool) {
        *lock(&self.list_fails) = fails;
    }

    fn rows(&self) -> MutexGuard<'_, Vec<MinterRecord>> {
        lock(&self.rows)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl MinterRegistry for MemoryRegistry {
    async fn list_all(&self) -> Result<Vec<MinterRecord>> {
        if *lock(&self.list_fails) {
            bail!("registry unavailable");
        }
        Ok(self.records())
    }

    async fn upsert(&self, address: Address, status: MinterStatus) -> Result<()> {
        if lock(&self.failing_writes).contains(&address) {
            bail!("write to minters failed for {address}");
        }
        let mut rows = self.rows();
        match rows.iter_mut().find(|r| r.address == address) {
            Some(row) => row.status = status,
            None => rows.push(MinterRecord::new(address, status)),
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn truncate_and_bulk_insert(&self, records: &[MinterRecord]) -> Result<()> {
        *self.rows() = records.to_vec();
        Ok(())
    }
}
