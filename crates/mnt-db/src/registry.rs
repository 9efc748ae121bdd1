use anyhow::Result;
use async_trait::async_trait;
use mnt_schemas::{Address, MinterRecord, MinterStatus};
use mnt_sync::MinterRegistry;
use sqlx::PgPool;

/// [`MinterRegistry`] over the `minters` table.
#[derive(Debug, Clone)]
pub struct PgMinterRegistry {
    pool: PgPool,
}

impl PgMinterRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MinterRegistry for PgMinterRegistry {
    async fn list_all(&self) -> Result<Vec<MinterRecord>> {
        Ok(crate::list_minters(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.record)
            .collect())
    }

    async fn upsert(&self, address: Address, status: MinterStatus) -> Result<()> {
        crate::upsert_minter(&self.pool, address, status).await
    }

    async fn truncate_and_bulk_insert(&self, records: &[MinterRecord]) -> Result<()> {
        crate::replace_minters(&self.pool, records).await
    }
}
