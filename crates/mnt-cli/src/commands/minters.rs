//! Role administration commands.
//!
//! Grant/revoke follow confirm-then-write: the registry is touched only after
//! the transaction is mined successfully.

use anyhow::{Context, Result};
use mnt_schemas::Receipt;
use mnt_sync::{fetch_role_members, SyncReport};

use super::{load_runtime, parse_address};

pub async fn grant(paths: &[&str], raw: &str) -> Result<()> {
    let address = parse_address(raw)?;
    let rt = load_runtime(paths)?;
    let chain = mnt_runtime::connect_chain(&rt).await?;
    let registry = mnt_runtime::connect_registry(&rt).await?;
    let driver = mnt_runtime::build_driver(&chain, registry);

    let receipt = driver.grant_minter(address).await?;
    print_receipt("granted", address, &receipt);
    Ok(())
}

pub async fn revoke(paths: &[&str], raw: &str) -> Result<()> {
    let address = parse_address(raw)?;
    let rt = load_runtime(paths)?;
    let chain = mnt_runtime::connect_chain(&rt).await?;
    let registry = mnt_runtime::connect_registry(&rt).await?;
    let driver = mnt_runtime::build_driver(&chain, registry);

    let receipt = driver.revoke_minter(address).await?;
    print_receipt("revoked", address, &receipt);
    Ok(())
}

fn print_receipt(verb: &str, address: mnt_schemas::Address, receipt: &Receipt) {
    println!("{verb}=true address={address}");
    println!("tx_hash={}", receipt.tx_hash);
    if let Some(block) = receipt.block_number {
        println!("block_number={block}");
    }
}

pub async fn print_minters(paths: &[&str]) -> Result<()> {
    let rt = load_runtime(paths)?;
    let client = mnt_runtime::connect_client(&rt).await?;
    let members = fetch_role_members(&*client)
        .await
        .context("failed to enumerate role members")?;
    println!("minter_count={}", members.len());
    for a in members {
        println!("{a}");
    }
    Ok(())
}

pub async fn sync(paths: &[&str], batch_size: Option<usize>, json: bool) -> Result<()> {
    let rt = load_runtime(paths)?;
    let batch_size = batch_size.unwrap_or(rt.settings.reconcile.batch_size);
    let chain = mnt_runtime::connect_chain(&rt).await?;
    let registry = mnt_runtime::connect_registry(&rt).await?;
    let driver = mnt_runtime::build_driver(&chain, registry);

    let report = driver.sync_all(batch_size).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    // Non-zero exit when anything is still diverging.
    report.into_result()?;
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "records={} batches={} changed={} unchanged={} failed={}",
        report.total_records,
        report.batches.len(),
        report.changed.len(),
        report.unchanged,
        report.failed.len()
    );
    for c in &report.changed {
        println!("changed address={} intent={} tx_hash={}", c.address, c.intent.as_str(), c.tx_hash);
    }
    for f in &report.failed {
        let intent = f.intent.map(|i| i.as_str()).unwrap_or("check");
        println!("failed address={} intent={} error={}", f.address, intent, f.error);
    }
}

pub async fn fetch(paths: &[&str]) -> Result<()> {
    let rt = load_runtime(paths)?;
    let chain = mnt_runtime::connect_chain(&rt).await?;
    let registry = mnt_runtime::connect_registry(&rt).await?;
    let driver = mnt_runtime::build_driver(&chain, registry);

    let rows = driver.seed_registry_from_chain().await?;
    println!("seeded_rows={rows}");
    Ok(())
}

pub async fn nonce(paths: &[&str]) -> Result<()> {
    let rt = load_runtime(paths)?;
    let chain = mnt_runtime::connect_chain(&rt).await?;
    println!("signer={}", chain.signer());
    println!("contract={}", chain.contract());
    println!("next_nonce={}", chain.nonces.current());
    Ok(())
}
