//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES. Callers resolve once at startup and
//! pass [`ResolvedSecrets`] into constructors. `Debug` redacts every value and
//! errors reference the env var name, never the value.

use anyhow::{bail, Result};

use crate::Settings;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// JSON-RPC endpoint. May embed an API key in its path.
    pub rpc_url: Option<String>,
    /// Hex-encoded secp256k1 key of the role administrator.
    pub signer_private_key: Option<String>,
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("rpc_url", &self.rpc_url.as_ref().map(|_| "<REDACTED>"))
            .field(
                "signer_private_key",
                &self.signer_private_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl ResolvedSecrets {
    pub fn require_rpc_url(&self, settings: &Settings) -> Result<&str> {
        require(self.rpc_url.as_deref(), &settings.chain.rpc_url_env)
    }

    pub fn require_signer_key(&self, settings: &Settings) -> Result<&str> {
        require(
            self.signer_private_key.as_deref(),
            &settings.signer.private_key_env,
        )
    }

    pub fn require_database_url(&self, settings: &Settings) -> Result<&str> {
        require(self.database_url.as_deref(), &settings.database.url_env)
    }
}

fn require<'a>(value: Option<&'a str>, env_name: &str) -> Result<&'a str> {
    match value {
        Some(v) => Ok(v),
        None => bail!("SECRETS_MISSING: env var {env_name} is not set"),
    }
}

/// Read the env vars named by `settings`. Missing or blank vars resolve to
/// `None`; each command decides which ones it needs.
pub fn resolve_secrets(settings: &Settings) -> ResolvedSecrets {
    resolve_secrets_with(settings, |name| std::env::var(name).ok())
}

/// As [`resolve_secrets`], reading values through `lookup`.
pub fn resolve_secrets_with<F>(settings: &Settings, lookup: F) -> ResolvedSecrets
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    ResolvedSecrets {
        rpc_url: get(&settings.chain.rpc_url_env),
        signer_private_key: get(&settings.signer.private_key_env),
        database_url: get(&settings.database.url_env),
    }
}
