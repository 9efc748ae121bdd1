use anyhow::Result;

use super::load_runtime;

pub async fn status(paths: &[&str]) -> Result<()> {
    let rt = load_runtime(paths)?;
    let pool = mnt_runtime::connect_db(&rt).await?;
    let s = mnt_db::status(&pool).await?;
    println!("db_ok={} has_minters_table={}", s.ok, s.has_minters_table);
    Ok(())
}

pub async fn migrate(paths: &[&str]) -> Result<()> {
    let rt = load_runtime(paths)?;
    let pool = mnt_runtime::connect_db(&rt).await?;
    mnt_db::migrate(&pool).await?;
    println!("migrations_applied=true");
    Ok(())
}
