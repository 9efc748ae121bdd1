//! Scenario: a record that already matches on-chain membership.
//!
//! # Invariants under test
//! - `sync_one` on a matching record issues zero transactions.
//! - Running `sync_one` twice on a mismatched record changes the chain once.

use std::sync::Arc;

use mnt_schemas::{MinterRecord, RoleIntent};
use mnt_sync::SyncOutcome;
use mnt_testkit::{addr, engine_for, MockChain};

#[tokio::test]
async fn matching_records_issue_no_transactions() {
    let holder = addr(1);
    let outsider = addr(2);
    let chain = Arc::new(MockChain::new().with_members([holder]));
    let engine = engine_for(chain.clone(), None).await;

    let out = engine.sync_one(&MinterRecord::active(holder)).await.unwrap();
    assert_eq!(out, SyncOutcome::Unchanged);
    let out = engine.sync_one(&MinterRecord::archived(outsider)).await.unwrap();
    assert_eq!(out, SyncOutcome::Unchanged);

    assert_eq!(chain.submission_count(), 0);
    assert_eq!(engine.nonces().current(), 0);
}

#[tokio::test]
async fn second_sync_after_change_is_a_no_op() {
    let a = addr(3);
    let chain = Arc::new(MockChain::new().with_pending_nonce(12));
    let engine = engine_for(chain.clone(), None).await;
    let record = MinterRecord::active(a);

    match engine.sync_one(&record).await.unwrap() {
        SyncOutcome::Changed { intent, receipt } => {
            assert_eq!(intent, RoleIntent::Grant);
            assert!(receipt.is_success());
        }
        other => panic!("expected a grant, got {other:?}"),
    }
    assert_eq!(engine.sync_one(&record).await.unwrap(), SyncOutcome::Unchanged);

    assert_eq!(chain.submission_count(), 1);
    assert_eq!(chain.used_nonces(), vec![12]);
}
