//! Process wiring shared by the `mnt` CLI and the daemon.
//!
//! Startup order: config -> secrets -> signer -> chain client -> nonce
//! allocator -> engine -> driver. Any failure before the engine exists is
//! fatal to the caller; nothing here retries.

use std::sync::Arc;

use anyhow::{Context, Result};
use mnt_chain::{RpcChainClient, RpcClientConfig, Signer};
use mnt_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets, LoadedConfig, ResolvedSecrets,
    Settings, UnusedKeyPolicy,
};
use mnt_db::PgMinterRegistry;
use mnt_schemas::Address;
use mnt_sync::{
    ChainClient, MinterRegistry, NonceAllocator, ReconciliationDriver, ResyncPolicy,
    RoleSyncEngine,
};
use tracing::{info, warn};

/// Effective configuration of one process.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub config_hash: String,
    pub settings: Settings,
    pub secrets: ResolvedSecrets,
}

impl RuntimeConfig {
    /// Load and merge `paths` (empty = all defaults), warn about unused
    /// keys and resolve secrets from the environment.
    pub fn load(paths: &[&str]) -> Result<Self> {
        let loaded = if paths.is_empty() {
            LoadedConfig::empty()?
        } else {
            load_layered_yaml(paths)?
        };
        Self::from_loaded(loaded)
    }

    pub fn from_loaded(loaded: LoadedConfig) -> Result<Self> {
        let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
        for ptr in &unused.unused_leaf_pointers {
            warn!(key = %ptr, "config key is not used");
        }
        let settings = loaded.settings()?;
        let secrets = resolve_secrets(&settings);
        Ok(Self {
            config_hash: loaded.config_hash,
            settings,
            secrets,
        })
    }

    pub fn resync_policy(&self) -> ResyncPolicy {
        ResyncPolicy {
            interval: self.settings.nonce.resync_interval(),
            retry_delay: self.settings.nonce.resync_retry(),
        }
    }
}

/// Translate settings into the JSON-RPC adapter's configuration.
pub fn rpc_client_config(settings: &Settings, rpc_url: &str, contract: Address) -> RpcClientConfig {
    let mut cfg = RpcClientConfig::new(rpc_url, contract);
    cfg.chain_id = settings.chain.chain_id;
    cfg.gas_limit = settings.chain.gas_limit;
    cfg.gas_price_wei = settings.chain.gas_price_wei.map(u128::from);
    cfg.receipt_poll = settings.chain.receipt_poll();
    cfg
}

/// Everything needed to change roles on chain.
pub struct ChainRuntime {
    pub client: Arc<RpcChainClient>,
    pub nonces: Arc<NonceAllocator>,
    pub engine: Arc<RoleSyncEngine>,
}

impl ChainRuntime {
    pub fn signer(&self) -> Address {
        self.nonces.account()
    }

    pub fn contract(&self) -> Address {
        self.client.contract()
    }
}

/// Build the signer and connect to the node. Reads only; no nonce state.
pub async fn connect_client(rt: &RuntimeConfig) -> Result<Arc<RpcChainClient>> {
    let settings = &rt.settings;
    let rpc_url = rt.secrets.require_rpc_url(settings)?;
    let key = rt.secrets.require_signer_key(settings)?;
    let signer = Signer::from_hex(key).with_context(|| {
        format!(
            "env var {} does not hold a valid private key",
            settings.signer.private_key_env
        )
    })?;
    let contract = settings.chain.resolve_contract()?;

    let client = RpcChainClient::connect(rpc_client_config(settings, rpc_url, contract), signer)
        .await
        .context("failed to connect to the JSON-RPC node")?;
    Ok(Arc::new(client))
}

/// [`connect_client`], then seed the nonce counter and build the engine.
pub async fn connect_chain(rt: &RuntimeConfig) -> Result<ChainRuntime> {
    let client = connect_client(rt).await?;
    let dyn_client: Arc<dyn ChainClient> = client.clone();

    let nonces = NonceAllocator::start(Arc::clone(&dyn_client))
        .await
        .context("failed to read the signer's pending nonce")?;
    let engine = Arc::new(
        RoleSyncEngine::new(dyn_client, Arc::clone(&nonces))
            .with_mined_timeout(rt.settings.chain.mined_timeout()),
    );

    info!(
        signer = %nonces.account(),
        contract = %client.contract(),
        chain_id = client.chain_id(),
        nonce = nonces.current(),
        "chain runtime ready"
    );
    Ok(ChainRuntime {
        client,
        nonces,
        engine,
    })
}

/// Connect to Postgres using the URL from the configured env var.
pub async fn connect_db(rt: &RuntimeConfig) -> Result<sqlx::PgPool> {
    let url = rt.secrets.require_database_url(&rt.settings)?;
    mnt_db::connect(url).await
}

pub async fn connect_registry(rt: &RuntimeConfig) -> Result<Arc<PgMinterRegistry>> {
    Ok(Arc::new(PgMinterRegistry::new(connect_db(rt).await?)))
}

pub fn build_driver(
    chain: &ChainRuntime,
    registry: Arc<dyn MinterRegistry>,
) -> ReconciliationDriver {
    ReconciliationDriver::new(registry, Arc::clone(&chain.engine))
}
