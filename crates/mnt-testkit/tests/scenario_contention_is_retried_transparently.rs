//! Scenario: the first submission loses its nonce to another sender.
//!
//! # Invariants under test
//! - "replacement transaction underpriced" is retried with the next nonce and
//!   the caller sees success.
//! - After many transactions sent from outside the process, one conflict
//!   re-reads the pending nonce and the next submission lands: no per-nonce
//!   creep, even without a background resync task.
//! - A terminal rejection is surfaced without retry.
//! - A reverted receipt is an error and still consumes the nonce.

use std::sync::Arc;

use mnt_sync::{ChainError, SyncError};
use mnt_testkit::{addr, engine_for, MockChain};

#[tokio::test]
async fn replacement_underpriced_is_retried_with_advanced_nonce() {
    let a = addr(1);
    let chain = Arc::new(MockChain::new().with_pending_nonce(20));
    let engine = engine_for(chain.clone(), None).await;
    chain.race_external_senders(1);

    let receipt = engine.grant(a).await.expect("contention must not surface");
    assert!(receipt.is_success());
    assert!(chain.holds_role(a));

    assert_eq!(chain.submission_count(), 2);
    assert_eq!(chain.external_nonces(), vec![20]);
    assert_eq!(chain.used_nonces(), vec![21]);
    assert_eq!(engine.nonces().current(), 22);
}

#[tokio::test]
async fn repeated_contention_keeps_retrying() {
    let a = addr(2);
    let chain = Arc::new(MockChain::new());
    let engine = engine_for(chain.clone(), None).await;
    chain.race_external_senders(5);

    engine.grant(a).await.unwrap();
    assert_eq!(chain.submission_count(), 6);
    assert_eq!(chain.used_nonces(), vec![5]);
}

#[tokio::test]
async fn stale_allocator_catches_up_after_manual_transactions() {
    let chain = Arc::new(MockChain::new().with_pending_nonce(1));
    let engine = engine_for(chain.clone(), None).await;
    // Two transactions sent by hand after startup.
    chain.send_external();
    chain.send_external();

    engine.grant(addr(3)).await.unwrap();
    assert_eq!(chain.used_nonces(), vec![3]);
    assert_eq!(engine.nonces().current(), 4);
}

#[tokio::test]
async fn conflict_after_many_external_transactions_converges_quickly() {
    let chain = Arc::new(MockChain::new().with_pending_nonce(3));
    let engine = engine_for(chain.clone(), None).await;
    for _ in 0..200 {
        chain.send_external();
    }

    engine.grant(addr(7)).await.unwrap();
    // One rejected attempt at the stale nonce, then the accepted one.
    assert_eq!(chain.submission_count(), 2);
    assert_eq!(chain.used_nonces(), vec![203]);
    assert_eq!(engine.nonces().current(), 204);
}

#[tokio::test]
async fn other_rejections_are_terminal() {
    let a = addr(4);
    let chain = Arc::new(MockChain::new());
    chain.reject_submissions_for(a, "insufficient funds for gas * price + value");
    let engine = engine_for(chain.clone(), None).await;

    let err = engine.grant(a).await.unwrap_err();
    match err {
        SyncError::Submission { address, source, .. } => {
            assert_eq!(address, a);
            assert!(matches!(source, ChainError::Rejected { .. }));
        }
        other => panic!("expected Submission, got {other:?}"),
    }
    assert_eq!(chain.submission_count(), 1);
    assert_eq!(engine.nonces().current(), 0);
}

#[tokio::test]
async fn revert_is_an_error_and_consumes_the_nonce() {
    let a = addr(5);
    let chain = Arc::new(MockChain::new().with_pending_nonce(9));
    chain.revert_for(a);
    let engine = engine_for(chain.clone(), None).await;

    let err = engine.grant(a).await.unwrap_err();
    assert!(matches!(err, SyncError::Reverted { .. }));
    assert!(!chain.holds_role(a));
    assert_eq!(chain.used_nonces(), vec![9]);
    assert_eq!(engine.nonces().current(), 10);

    // The next request uses the following nonce without contention.
    engine.grant(addr(6)).await.unwrap();
    assert_eq!(chain.used_nonces(), vec![9, 10]);
    assert_eq!(chain.submission_count(), 2);
}
