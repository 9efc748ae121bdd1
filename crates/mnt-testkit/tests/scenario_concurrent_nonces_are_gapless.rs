//! Scenario: many role changes race for nonces from one signer.
//!
//! # Invariants under test
//! - N concurrent requests consume exactly `{start, ..., start+N-1}`: no
//!   nonce is used twice and none is skipped.
//! - Contention between sibling requests never surfaces to callers.
//! - The allocator ends at `start + N`, matching the chain's pending nonce.

use std::sync::Arc;
use std::time::Duration;

use mnt_testkit::{addr, engine_for, MockChain};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_grants_use_contiguous_nonces() {
    const START: u64 = 100;
    const N: u32 = 64;

    let chain = Arc::new(
        MockChain::new()
            .with_pending_nonce(START)
            .with_mine_delay(Duration::from_millis(5)),
    );
    let engine = engine_for(chain.clone(), None).await;

    let mut handles = Vec::new();
    for i in 0..N {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move { engine.grant(addr(i)).await }));
    }
    for h in handles {
        h.await.unwrap().expect("grant must succeed despite contention");
    }

    let expected: Vec<u64> = (START..START + N as u64).collect();
    assert_eq!(chain.used_nonces(), expected);
    assert_eq!(engine.nonces().current(), START + N as u64);
    assert_eq!(chain.chain_pending_nonce(), START + N as u64);
    assert_eq!(chain.members().len(), N as usize);
    // Every lost race is one extra submission, never an extra consumed nonce.
    assert!(chain.submission_count() >= N as usize);
    assert_eq!(chain.accepted_count(), N as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_grants_and_revokes_stay_gapless() {
    const START: u64 = 7;
    let holders: Vec<_> = (0..20).map(addr).collect();
    let chain = Arc::new(
        MockChain::new()
            .with_pending_nonce(START)
            .with_members(holders.clone()),
    );
    let engine = engine_for(chain.clone(), None).await;

    let mut handles = Vec::new();
    for (i, a) in holders.iter().copied().enumerate() {
        let revoker = Arc::clone(&engine);
        handles.push(tokio::spawn(async move { revoker.revoke(a).await }));
        let granter = Arc::clone(&engine);
        let fresh = addr(1000 + i as u32);
        handles.push(tokio::spawn(async move { granter.grant(fresh).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let expected: Vec<u64> = (START..START + 40).collect();
    assert_eq!(chain.used_nonces(), expected);
    for a in &holders {
        assert!(!chain.holds_role(*a));
    }
    assert_eq!(chain.members().len(), 20);
}
