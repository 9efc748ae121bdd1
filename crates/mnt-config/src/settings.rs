//! Typed view over the merged config document.
//!
//! Every field has a default, so an empty config is valid. The YAML names
//! env vars for anything sensitive; values are resolved by
//! [`crate::resolve_secrets`].

use anyhow::{bail, Context, Result};
use mnt_schemas::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Fallback for `chain.contract_address` when the config leaves it unset.
pub const ENV_CONTRACT_ADDRESS: &str = "MNT_CONTRACT_ADDRESS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chain: ChainSettings,
    pub signer: SignerSettings,
    pub nonce: NonceSettings,
    pub reconcile: ReconcileSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub rpc_url_env: String,
    pub contract_address: Option<Address>,
    /// Pinned chain id; queried with `eth_chainId` when unset.
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    /// Pinned gas price; queried with `eth_gasPrice` when unset.
    pub gas_price_wei: Option<u64>,
    pub receipt_poll_ms: u64,
    /// Upper bound on waiting for a receipt. Unset waits indefinitely.
    pub mined_timeout_secs: Option<u64>,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url_env: "MNT_RPC_URL".to_string(),
            contract_address: None,
            chain_id: None,
            gas_limit: 300_000,
            gas_price_wei: None,
            receipt_poll_ms: 1_000,
            mined_timeout_secs: None,
        }
    }
}

impl ChainSettings {
    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn mined_timeout(&self) -> Option<Duration> {
        self.mined_timeout_secs.map(Duration::from_secs)
    }

    /// The configured contract, or the one named by `MNT_CONTRACT_ADDRESS`.
    pub fn resolve_contract(&self) -> Result<Address> {
        if let Some(a) = self.contract_address {
            return Ok(a);
        }
        let raw = std::env::var(ENV_CONTRACT_ADDRESS).with_context(|| {
            format!("chain.contract_address is unset and env var {ENV_CONTRACT_ADDRESS} is missing")
        })?;
        raw.trim()
            .parse()
            .with_context(|| format!("env var {ENV_CONTRACT_ADDRESS} is not a valid address"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerSettings {
    pub private_key_env: String,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            private_key_env: "MNT_SIGNER_PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonceSettings {
    pub resync_interval_secs: u64,
    pub resync_retry_secs: u64,
}

impl Default for NonceSettings {
    fn default() -> Self {
        Self {
            resync_interval_secs: 60,
            resync_retry_secs: 5,
        }
    }
}

impl NonceSettings {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn resync_retry(&self) -> Duration {
        Duration::from_secs(self.resync_retry_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub batch_size: usize,
    /// Seconds between daemon reconciliation passes; 0 disables the tick.
    pub interval_secs: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            interval_secs: 0,
        }
    }
}

impl ReconcileSettings {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url_env: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: "MNT_DATABASE_URL".to_string(),
        }
    }
}

impl Settings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: Settings =
            serde_json::from_value(config_json.clone()).context("CONFIG_INVALID: bad settings")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.reconcile.batch_size == 0 {
            bail!("CONFIG_INVALID: reconcile.batch_size must be greater than zero");
        }
        if self.chain.gas_limit == 0 {
            bail!("CONFIG_INVALID: chain.gas_limit must be greater than zero");
        }
        if self.chain.receipt_poll_ms == 0 {
            bail!("CONFIG_INVALID: chain.receipt_poll_ms must be greater than zero");
        }
        if self.nonce.resync_interval_secs == 0 {
            bail!("CONFIG_INVALID: nonce.resync_interval_secs must be greater than zero");
        }
        for (leaf, name) in [
            ("chain.rpc_url_env", &self.chain.rpc_url_env),
            ("signer.private_key_env", &self.signer.private_key_env),
            ("database.url_env", &self.database.url_env),
        ] {
            if name.trim().is_empty() {
                bail!("CONFIG_INVALID: {leaf} must name an env var");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let s = Settings::from_config_json(&json!({})).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.reconcile.batch_size, 50);
        assert_eq!(s.reconcile.interval(), None);
        assert_eq!(s.chain.receipt_poll(), Duration::from_secs(1));
        assert_eq!(s.nonce.resync_retry(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_config_json(&json!({
            "chain": { "gas_limit": 120000, "contract_address": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed" },
            "reconcile": { "interval_secs": 30 }
        }))
        .unwrap();
        assert_eq!(s.chain.gas_limit, 120_000);
        assert_eq!(s.chain.rpc_url_env, "MNT_RPC_URL");
        assert_eq!(s.reconcile.batch_size, 50);
        assert_eq!(s.reconcile.interval(), Some(Duration::from_secs(30)));
        assert!(s.chain.resolve_contract().is_ok());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = Settings::from_config_json(&json!({ "reconcile": { "batch_size": 0 } }))
            .unwrap_err()
            .to_string();
        assert!(err.contains("batch_size"), "{err}");
    }

    #[test]
    fn malformed_contract_rejected() {
        let err = Settings::from_config_json(&json!({ "chain": { "contract_address": "0x12" } }));
        assert!(err.is_err());
    }
}
