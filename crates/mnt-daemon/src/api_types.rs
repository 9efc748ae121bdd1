//! Request and response types for all mnt-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use mnt_schemas::{Address, RoleIntent, TxHash};
use mnt_sync::{ChangedMinter, FailedMinter};
use serde::{Deserialize, Serialize};

use crate::state::SyncSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable tag, e.g. "invalid_address", "chain_error".
    pub kind: String,
}

// ---------------------------------------------------------------------------
// /v1/minters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintersResponse {
    pub count: usize,
    pub minters: Vec<Address>,
}

/// Body of POST /v1/minters/grant and /v1/minters/revoke. The address is
/// kept as a string so a malformed value becomes a 400, not a 422.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChangeResponse {
    pub address: Address,
    pub intent: RoleIntent,
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

// ---------------------------------------------------------------------------
// /v1/sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub summary: SyncSummary,
    pub changed: Vec<ChangedMinter>,
    pub failed: Vec<FailedMinter>,
}
