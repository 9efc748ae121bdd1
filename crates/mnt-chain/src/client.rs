use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mnt_schemas::{Address, Receipt, ReceiptStatus, RoleChangeRequest, RoleIntent, TxHash};
use mnt_sync::{ChainClient, ChainError};
use primitive_types::U256;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::abi;
use crate::rpc::{self, RpcReceipt, RpcRequest, RpcResponse};
use crate::signer::Signer;
use crate::tx::LegacyTx;

pub const DEFAULT_GAS_LIMIT: u64 = 300_000;
pub const DEFAULT_RECEIPT_POLL: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub rpc_url: String,
    pub contract: Address,
    /// `None`: ask the node (`eth_chainId`).
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    /// `None`: ask the node once at connect time (`eth_gasPrice`).
    pub gas_price_wei: Option<u128>,
    pub receipt_poll: Duration,
    pub request_timeout: Duration,
}

impl RpcClientConfig {
    pub fn new(rpc_url: impl Into<String>, contract: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract,
            chain_id: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price_wei: None,
            receipt_poll: DEFAULT_RECEIPT_POLL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// [`ChainClient`] over JSON-RPC/HTTP, signing locally with one key.
pub struct RpcChainClient {
    http: reqwest::Client,
    url: String,
    contract: Address,
    signer: Signer,
    chain_id: u64,
    gas_limit: u64,
    gas_price: U256,
    receipt_poll: Duration,
    next_id: AtomicU64,
}

impl RpcChainClient {
    /// Build the client and resolve chain id and gas price from the node
    /// unless pinned in `cfg`. Any failure here means the node is unusable.
    pub async fn connect(cfg: RpcClientConfig, signer: Signer) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ChainError::Transport(format!("http client init failed: {e}")))?;

        let mut client = Self {
            http,
            url: cfg.rpc_url,
            contract: cfg.contract,
            signer,
            chain_id: cfg.chain_id.unwrap_or(0),
            gas_limit: cfg.gas_limit,
            gas_price: cfg.gas_price_wei.map(U256::from).unwrap_or_default(),
            receipt_poll: cfg.receipt_poll,
            next_id: AtomicU64::new(1),
        };

        if cfg.chain_id.is_none() {
            let v = client.request("eth_chainId", json!([])).await?;
            client.chain_id = rpc::parse_quantity(as_str(&v, "eth_chainId")?)?;
        }
        if cfg.gas_price_wei.is_none() {
            let v = client.request("eth_gasPrice", json!([])).await?;
            client.gas_price = parse_u256(as_str(&v, "eth_gasPrice")?)?;
        }

        info!(
            signer = %client.signer.address(),
            contract = %client.contract,
            chain_id = client.chain_id,
            gas_price_wei = %client.gas_price,
            gas_limit = client.gas_limit,
            "chain client connected"
        );
        Ok(client)
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gas_price(&self) -> U256 {
        self.gas_price
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest::new(id, method, params);

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = resp.status();
        let parsed: RpcResponse = match resp.json().await {
            Ok(p) => p,
            Err(_) if !status.is_success() => {
                return Err(ChainError::Transport(format!(
                    "{method}: http status {}",
                    status.as_u16()
                )))
            }
            Err(e) => return Err(ChainError::Decode(format!("{method}: {e}"))),
        };

        if let Some(err) = parsed.error {
            debug!(method, code = err.code, message = %err.message, "rpc error");
            return Err(rpc::classify(err.code, &err.message));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn call_contract(&self, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let params = json!([
            {
                "from": self.signer.address().to_lower_hex(),
                "to": self.contract.to_lower_hex(),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let v = self.request("eth_call", params).await?;
        rpc::parse_data(as_str(&v, "eth_call")?)
    }

    /// `None` while the transaction is not yet mined.
    pub async fn receipt(&self, tx: TxHash) -> Result<Option<Receipt>, ChainError> {
        let v = self
            .request("eth_getTransactionReceipt", json!([tx.to_string()]))
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        let r: RpcReceipt = serde_json::from_value(v)
            .map_err(|e| ChainError::Decode(format!("receipt: {e}")))?;
        let tx_hash = TxHash::parse_hex(&r.transaction_hash)
            .ok_or_else(|| ChainError::Decode(format!("receipt hash: {}", r.transaction_hash)))?;
        let status = match r.status.as_deref() {
            Some(s) if rpc::parse_quantity(s)? == 0 => ReceiptStatus::Failed,
            _ => ReceiptStatus::Success,
        };
        Ok(Some(Receipt {
            tx_hash,
            status,
            block_number: r.block_number.as_deref().map(rpc::parse_quantity).transpose()?,
            gas_used: r.gas_used.as_deref().map(rpc::parse_quantity).transpose()?,
        }))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn signer(&self) -> Address {
        self.signer.address()
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError> {
        let v = self
            .request(
                "eth_getTransactionCount",
                json!([account.to_lower_hex(), "pending"]),
            )
            .await?;
        rpc::parse_quantity(as_str(&v, "eth_getTransactionCount")?)
    }

    async fn has_role(&self, account: Address) -> Result<bool, ChainError> {
        let ret = self.call_contract(abi::has_role(&account)).await?;
        abi::decode_bool(&ret).map_err(|e| ChainError::Decode(format!("hasRole: {e}")))
    }

    async fn role_member_count(&self) -> Result<u64, ChainError> {
        let ret = self.call_contract(abi::get_role_member_count()).await?;
        abi::decode_u64(&ret).map_err(|e| ChainError::Decode(format!("getRoleMemberCount: {e}")))
    }

    async fn role_member(&self, index: u64) -> Result<Address, ChainError> {
        let ret = self.call_contract(abi::get_role_member(index)).await?;
        abi::decode_address(&ret).map_err(|e| ChainError::Decode(format!("getRoleMember: {e}")))
    }

    async fn send_role_change(
        &self,
        request: &RoleChangeRequest,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        let data = match request.intent {
            RoleIntent::Grant => abi::set_minter(&request.address),
            RoleIntent::Revoke => abi::remove_minter(&request.address),
        };
        let tx = LegacyTx {
            nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.contract,
            value: U256::zero(),
            data,
            chain_id: self.chain_id,
        };
        let signed = tx.sign(&self.signer).map_err(|e| ChainError::Rejected {
            code: None,
            message: e.to_string(),
        })?;

        let v = self
            .request("eth_sendRawTransaction", json!([signed.raw_hex()]))
            .await?;
        let node_hash = TxHash::parse_hex(as_str(&v, "eth_sendRawTransaction")?)
            .ok_or_else(|| ChainError::Decode("eth_sendRawTransaction: bad hash".into()))?;
        if node_hash != signed.hash {
            warn!(local = %signed.hash, node = %node_hash, "node reported a different tx hash");
        }
        Ok(node_hash)
    }

    async fn wait_mined(&self, tx: TxHash) -> Result<Receipt, ChainError> {
        loop {
            match self.receipt(tx).await {
                Ok(Some(r)) => return Ok(r),
                Ok(None) => {}
                // Keep polling through transient node trouble.
                Err(ChainError::Transport(e)) | Err(ChainError::Timeout(e)) => {
                    debug!(%tx, error = %e, "receipt poll failed; retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}

fn transport_error(method: &str, e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout(format!("{method}: {e}"))
    } else {
        ChainError::Transport(format!("{method}: {e}"))
    }
}

fn as_str<'a>(v: &'a Value, method: &str) -> Result<&'a str, ChainError> {
    v.as_str()
        .ok_or_else(|| ChainError::Decode(format!("{method}: expected string result, got {v}")))
}

fn parse_u256(s: &str) -> Result<U256, ChainError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity without 0x prefix: {s}")))?;
    U256::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("bad quantity {s}: {e:?}")))
}
