//! Command handler modules for the `mnt` CLI.
//!
//! Shared helpers live here; command logic lives in the submodules.

pub mod db;
pub mod minters;

use anyhow::{Context, Result};
use mnt_schemas::Address;
use mnt_runtime::RuntimeConfig;

/// Parse an operator-supplied address before any network or DB work.
pub fn parse_address(raw: &str) -> Result<Address> {
    raw.parse()
        .with_context(|| format!("invalid address {raw:?}: expected 0x followed by 40 hex digits"))
}

pub fn load_runtime(paths: &[&str]) -> Result<RuntimeConfig> {
    let rt = RuntimeConfig::load(paths)?;
    tracing::debug!(config_hash = %rt.config_hash, "config loaded");
    Ok(rt)
}

pub fn config_hash(paths: &[&str]) -> Result<()> {
    let loaded = mnt_config::load_layered_yaml(paths)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}
