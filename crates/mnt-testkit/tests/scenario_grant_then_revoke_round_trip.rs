//! Scenario: grant followed by revoke of the same address.
//!
//! # Invariants under test
//! - The address ends without the role.
//! - Exactly two nonces are consumed, in order.

use std::sync::Arc;

use mnt_sync::ChainClient;
use mnt_testkit::{addr, engine_for, MockChain};

#[tokio::test]
async fn grant_then_revoke_leaves_no_role_and_two_nonces() {
    let a = addr(42);
    let chain = Arc::new(MockChain::new().with_pending_nonce(3));
    let engine = engine_for(chain.clone(), None).await;

    let granted = engine.grant(a).await.unwrap();
    assert!(chain.has_role(a).await.unwrap());
    let revoked = engine.revoke(a).await.unwrap();

    assert!(!chain.has_role(a).await.unwrap());
    assert_ne!(granted.tx_hash, revoked.tx_hash);
    assert_eq!(chain.used_nonces(), vec![3, 4]);
    assert_eq!(engine.nonces().current(), 5);
}
