//! Axum router and all HTTP handlers for mnt-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  The scenario tests in `tests/` compose the bare
//! router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use mnt_schemas::{Address, Receipt, RoleIntent};
use mnt_sync::DriverError;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        AddressRequest, ErrorResponse, HealthResponse, MintersResponse, RoleChangeResponse,
        SyncRequest, SyncResponse,
    },
    state::{AppState, BusMsg, SyncStartError, SyncSummary},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/minters", get(list_minters))
        .route("/v1/minters/grant", post(grant_minter))
        .route("/v1/minters/revoke", post(revoke_minter))
        .route("/v1/sync", post(sync))
        .with_state(state)
}

fn error_response(status: StatusCode, kind: &str, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind: kind.to_string(),
        }),
    )
        .into_response()
}

/// Map a driver failure to an HTTP status. Chain-side failures are 502;
/// registry-side failures are 500.
fn driver_error_response(err: &DriverError) -> Response {
    let (status, kind) = match err {
        DriverError::Chain(_) | DriverError::Sync(_) => (StatusCode::BAD_GATEWAY, "chain_error"),
        DriverError::RegistryBehindChain { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "registry_behind_chain")
        }
        DriverError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "registry_error"),
        DriverError::InvalidBatchSize => (StatusCode::BAD_REQUEST, "invalid_batch_size"),
        DriverError::Incomplete { .. } => (StatusCode::BAD_GATEWAY, "incomplete"),
        DriverError::PartialMemberRead { .. } => (StatusCode::BAD_GATEWAY, "partial_member_read"),
    };
    error_response(status, kind, format!("{err:#}"))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.snapshot().await;
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// GET /v1/minters
// ---------------------------------------------------------------------------

pub(crate) async fn list_minters(State(st): State<Arc<AppState>>) -> Response {
    match st.driver.fetch_on_chain_minters().await {
        Ok(minters) => (
            StatusCode::OK,
            Json(MintersResponse {
                count: minters.len(),
                minters,
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "minters: enumeration failed");
            driver_error_response(&err)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/minters/grant  /v1/minters/revoke
// ---------------------------------------------------------------------------

pub(crate) async fn grant_minter(
    State(st): State<Arc<AppState>>,
    Json(body): Json<AddressRequest>,
) -> Response {
    change_role(st, body, RoleIntent::Grant).await
}

pub(crate) async fn revoke_minter(
    State(st): State<Arc<AppState>>,
    Json(body): Json<AddressRequest>,
) -> Response {
    change_role(st, body, RoleIntent::Revoke).await
}

async fn change_role(st: Arc<AppState>, body: AddressRequest, intent: RoleIntent) -> Response {
    let address: Address = match body.address.parse() {
        Ok(a) => a,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_address",
                format!("invalid address {:?}: {e}", body.address),
            )
        }
    };

    let res: Result<Receipt, DriverError> = match intent {
        RoleIntent::Grant => st.driver.grant_minter(address).await,
        RoleIntent::Revoke => st.driver.revoke_minter(address).await,
    };

    match res {
        Ok(receipt) => {
            info!(%address, intent = intent.as_str(), tx_hash = %receipt.tx_hash, "minters: role changed");
            let _ = st.bus.send(BusMsg::LogLine {
                level: "INFO".to_string(),
                msg: format!("{} {address} ({})", intent.as_str(), receipt.tx_hash),
            });
            (
                StatusCode::OK,
                Json(RoleChangeResponse {
                    address,
                    intent,
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number,
                }),
            )
                .into_response()
        }
        Err(err) => {
            warn!(%address, intent = intent.as_str(), error = %err, "minters: role change failed");
            driver_error_response(&err)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/sync
// ---------------------------------------------------------------------------

/// Run one reconciliation pass and return its report. The body is optional.
pub(crate) async fn sync(
    State(st): State<Arc<AppState>>,
    body: Option<Json<SyncRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    match st.run_sync(req.batch_size).await {
        Ok(report) => (
            StatusCode::OK,
            Json(SyncResponse {
                summary: SyncSummary::from(&report),
                changed: report.changed,
                failed: report.failed,
            }),
        )
            .into_response(),
        Err(SyncStartError::AlreadyRunning) => error_response(
            StatusCode::CONFLICT,
            "sync_in_progress",
            SyncStartError::AlreadyRunning,
        ),
        Err(SyncStartError::Driver(err)) => driver_error_response(&err),
        Err(err @ SyncStartError::Task(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "sync_task_failed", err)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Status(_) => "status",
                    BusMsg::LogLine { .. } => "log",
                    BusMsg::SyncFinished(_) => "sync",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
