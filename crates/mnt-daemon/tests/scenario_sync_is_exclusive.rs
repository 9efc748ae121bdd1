//! Scenario: only one reconciliation pass runs at a time.
//!
//! # Invariants under test
//! - POST /v1/sync while a pass is in flight is refused with 409.
//! - The in-flight pass still completes and the flag clears afterwards.
//! - Abandoning a pass mid-batch does not release the flag early: a new pass
//!   is refused until the first finishes and the batch bound holds.
//! - The periodic tick reconciles without any HTTP request and records the
//!   run as `last_sync`.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use mnt_daemon::{
    routes,
    state::{spawn_reconcile_tick, AppState, SyncStartError},
};
use mnt_schemas::{MinterRecord, MinterStatus};
use mnt_testkit::{addr, MemoryRegistry, MockChain};
use tower::ServiceExt;

async fn make_state(chain: Arc<MockChain>, registry: Arc<MemoryRegistry>) -> Arc<AppState> {
    let driver = Arc::new(mnt_testkit::driver_for(chain, registry).await);
    Arc::new(AppState::new(driver, None, 50))
}

fn sync_request() -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/sync")
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_sync_is_409() {
    let chain = Arc::new(MockChain::new().with_mine_delay(Duration::from_millis(300)));
    let registry = Arc::new(MemoryRegistry::with_records([MinterRecord::active(addr(1))]));
    let st = make_state(Arc::clone(&chain), registry).await;

    let first = tokio::spawn(routes::build_router(Arc::clone(&st)).oneshot(sync_request()));
    wait_until("first pass to start", || st.is_sync_running()).await;

    let resp = routes::build_router(Arc::clone(&st))
        .oneshot(sync_request())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = first.await.unwrap().unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!st.is_sync_running());
    assert!(chain.holds_role(addr(1)));
    // Only the first pass submitted anything.
    assert_eq!(chain.submission_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_sync_refuses_while_running() {
    let chain = Arc::new(MockChain::new().with_mine_delay(Duration::from_millis(200)));
    let registry = Arc::new(MemoryRegistry::with_records([MinterRecord::active(addr(1))]));
    let st = make_state(chain, registry).await;

    let bg = {
        let st = Arc::clone(&st);
        tokio::spawn(async move { st.run_sync(None).await.map(|r| r.changed.len()) })
    };
    wait_until("pass to start", || st.is_sync_running()).await;
    assert!(matches!(st.run_sync(None).await, Err(SyncStartError::AlreadyRunning)));

    assert_eq!(bg.await.unwrap().unwrap(), 1);
    // Flag cleared: a new pass may start and finds nothing to do.
    let report = st.run_sync(None).await.unwrap();
    assert_eq!(report.unchanged, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_pass_keeps_the_flag_until_it_finishes() {
    let chain = Arc::new(MockChain::new().with_mine_delay(Duration::from_millis(300)));
    let registry = Arc::new(MemoryRegistry::with_records((0..20).map(|n| MinterRecord::active(addr(n)))));
    let driver = Arc::new(mnt_testkit::driver_for(Arc::clone(&chain), Arc::clone(&registry)).await);
    let st = Arc::new(AppState::new(driver, None, 10));

    let caller = {
        let st = Arc::clone(&st);
        tokio::spawn(async move { st.run_sync(None).await.is_ok() })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();
    let _ = caller.await;

    // The caller is gone but the pass is not.
    assert!(st.is_sync_running());
    assert!(matches!(st.run_sync(None).await, Err(SyncStartError::AlreadyRunning)));

    wait_until("abandoned pass to finish", || !st.is_sync_running()).await;
    assert!(chain.max_in_flight() <= 10, "batch bound exceeded: {}", chain.max_in_flight());
    assert_eq!(chain.members().len(), 20);
    assert_eq!(registry.status_of(addr(19)), Some(MinterStatus::Active));
    assert!(st.last_sync().await.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_tick_reconciles() {
    let chain = Arc::new(MockChain::new().with_members([addr(7)]));
    let registry = Arc::new(MemoryRegistry::with_records([
        MinterRecord::archived(addr(7)),
        MinterRecord::active(addr(8)),
    ]));
    let st = make_state(Arc::clone(&chain), registry).await;
    let mut bus = st.bus.subscribe();

    let tick = spawn_reconcile_tick(Arc::clone(&st), Duration::from_millis(20));

    wait_until("tick to converge chain", || {
        chain.holds_role(addr(8)) && !chain.holds_role(addr(7))
    })
    .await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let last = loop {
        if let Some(s) = st.last_sync().await {
            break s;
        }
        assert!(tokio::time::Instant::now() < deadline, "no last_sync recorded");
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    tick.abort();

    assert_eq!(last.total_records, 2);
    assert_eq!(last.failed, 0);

    // The pass was announced on the bus.
    let mut saw_sync = false;
    while let Ok(msg) = bus.try_recv() {
        if matches!(msg, mnt_daemon::state::BusMsg::SyncFinished(_)) {
            saw_sync = true;
        }
    }
    assert!(saw_sync);
}
