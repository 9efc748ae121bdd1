use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use mnt_schemas::{Address, MinterRecord, MinterStatus};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use tracing::debug;

mod registry;

pub use registry::PgMinterRegistry;

pub const ENV_DB_URL: &str = "MNT_DATABASE_URL";

/// Rows per multi-row INSERT; keeps bind parameters well under Postgres' limit.
const INSERT_CHUNK: usize = 1000;

/// Connect to Postgres using the URL held in env var `env_var`.
pub async fn connect_from_env_var(env_var: &str) -> Result<PgPool> {
    let url = std::env::var(env_var).with_context(|| format!("missing env var {env_var}"))?;
    connect(&url).await
}

/// Connect to Postgres using MNT_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    connect_from_env_var(ENV_DB_URL).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_minters_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'minters'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_minters_table: exists,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinterRow {
    pub id: i64,
    pub record: MinterRecord,
    pub updated_at_utc: DateTime<Utc>,
}

type RawMinterRow = (i64, String, i16, DateTime<Utc>);

fn decode_row((id, address, status, updated_at_utc): RawMinterRow) -> Result<MinterRow> {
    let parsed: Address = address
        .parse()
        .with_context(|| format!("minters row {id} has malformed address {address:?}"))?;
    let status = MinterStatus::from_i16(status)
        .ok_or_else(|| anyhow!("minters row {id} has unknown status {status}"))?;
    Ok(MinterRow {
        id,
        record: MinterRecord::new(parsed, status),
        updated_at_utc,
    })
}

/// All registry rows in insertion order.
pub async fn list_minters(pool: &PgPool) -> Result<Vec<MinterRow>> {
    let rows = sqlx::query_as::<_, RawMinterRow>(
        r#"
        select id, address, status, updated_at_utc
        from minters
        order by id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_minters failed")?;

    rows.into_iter().map(decode_row).collect()
}

pub async fn fetch_minter(pool: &PgPool, address: Address) -> Result<Option<MinterRow>> {
    let row = sqlx::query_as::<_, RawMinterRow>(
        r#"
        select id, address, status, updated_at_utc
        from minters
        where address = $1
        "#,
    )
    .bind(address.to_lower_hex())
    .fetch_optional(pool)
    .await
    .context("fetch_minter failed")?;

    row.map(decode_row).transpose()
}

/// Insert or update one address. Single statement, so atomic on its own.
pub async fn upsert_minter(pool: &PgPool, address: Address, status: MinterStatus) -> Result<()> {
    sqlx::query(
        r#"
        insert into minters (address, status, updated_at_utc)
        values ($1, $2, now())
        on conflict (address) do update
           set status = excluded.status,
               updated_at_utc = excluded.updated_at_utc
        "#,
    )
    .bind(address.to_lower_hex())
    .bind(status.as_i16())
    .execute(pool)
    .await
    .with_context(|| format!("upsert_minter failed for {address}"))?;
    Ok(())
}

/// Replace the whole table with `records` in one transaction: either the old
/// contents survive untouched or the new set is fully written.
pub async fn replace_minters(pool: &PgPool, records: &[MinterRecord]) -> Result<()> {
    let mut tx = pool.begin().await.context("replace_minters begin failed")?;

    sqlx::query("truncate table minters restart identity")
        .execute(&mut *tx)
        .await
        .context("truncate minters failed")?;

    for chunk in records.chunks(INSERT_CHUNK) {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("insert into minters (address, status) ");
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.address.to_lower_hex())
                .push_bind(r.status.as_i16());
        });
        qb.build()
            .execute(&mut *tx)
            .await
            .context("bulk insert minters failed")?;
    }

    tx.commit().await.context("replace_minters commit failed")?;
    debug!(rows = records.len(), "minters table replaced");
    Ok(())
}
