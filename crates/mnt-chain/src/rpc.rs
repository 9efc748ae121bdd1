//! JSON-RPC 2.0 envelopes and node error classification.

use mnt_sync::ChainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Node messages that mean "this nonce is already taken": another pending
/// transaction holds it, or a mined one already consumed it.
const CONTENTION_MESSAGES: &[&str] = &["replacement transaction underpriced", "nonce too low"];

/// Map a node-side JSON-RPC error onto [`ChainError`].
///
/// This is the only place node error text is inspected.
pub fn classify(code: i64, message: &str) -> ChainError {
    let lower = message.to_ascii_lowercase();
    if CONTENTION_MESSAGES.iter().any(|m| lower.contains(m)) {
        return ChainError::NonceContention(message.to_string());
    }
    ChainError::Rejected {
        code: Some(code),
        message: message.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(s: &str) -> Result<u64, ChainError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity without 0x prefix: {s}")))?;
    if digits.is_empty() {
        return Err(ChainError::Decode("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("bad quantity {s}: {e}")))
}

pub fn parse_data(s: &str) -> Result<Vec<u8>, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| ChainError::Decode(format!("bad hex data: {e}")))
}

pub fn quantity(v: u64) -> String {
    format!("{v:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_messages_are_classified() {
        assert!(classify(-32000, "replacement transaction underpriced").is_nonce_contention());
        assert!(classify(-32000, "Nonce too low").is_nonce_contention());
        assert!(classify(-32003, "nonce too low: address 0xabc, tx: 3 state: 5").is_nonce_contention());
    }

    #[test]
    fn other_messages_are_rejections() {
        match classify(-32000, "insufficient funds for gas * price + value") {
            ChainError::Rejected { code, message } => {
                assert_eq!(code, Some(-32000));
                assert!(message.contains("insufficient funds"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!classify(3, "execution reverted").is_nonce_contention());
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("26").is_err());
        assert!(parse_quantity("0x").is_err());
        assert_eq!(quantity(26), "0x1a");
        assert_eq!(quantity(0), "0x0");
    }
}
