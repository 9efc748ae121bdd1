//! In-memory ledger that enforces real nonce semantics for one signer.
//!
//! Submission rules, checked atomically under one lock:
//! - nonce below the account's pending nonce -> `NonceContention`
//!   ("replacement transaction underpriced"), nothing recorded as used;
//! - nonce above the pending nonce -> `Rejected` (a gap would strand every
//!   later transaction, so the mock refuses it outright);
//! - otherwise the transaction is accepted, the nonce is recorded and the
//!   pending nonce moves forward.
//!
//! Role membership changes when a transaction is mined, i.e. when
//! [`ChainClient::wait_mined`] returns, after the configured mine delay.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use mnt_schemas::{Address, Receipt, ReceiptStatus, RoleChangeRequest, RoleIntent, TxHash};
use mnt_sync::{ChainClient, ChainError};

pub const REPLACEMENT_UNDERPRICED: &str = "replacement transaction underpriced";

/// Default signing identity of a [`MockChain`].
pub const MOCK_SIGNER: Address = Address::from_bytes([0x5e; 20]);

#[derive(Default)]
struct Ledger {
    pending_nonce: u64,
    /// Role members in enumeration order (swap-remove on revoke, like an
    /// enumerable set contract).
    members: Vec<Address>,
    used_nonces: Vec<u64>,
    external_nonces: Vec<u64>,
    in_pool: HashMap<TxHash, (RoleChangeRequest, u64)>,
    mined: HashMap<TxHash, Receipt>,
    block: u64,

    // Fault injection.
    reject: HashMap<Address, String>,
    revert: HashSet<Address>,
    role_check_failures: HashSet<Address>,
    member_read_failures: HashSet<u64>,
    nonce_unreachable: bool,
    external_races: usize,
}

pub struct MockChain {
    signer: Address,
    mine_delay: Duration,
    ledger: Mutex<Ledger>,
    submissions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            signer: MOCK_SIGNER,
            mine_delay: Duration::ZERO,
            ledger: Mutex::new(Ledger::default()),
            submissions: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_pending_nonce(self, nonce: u64) -> Self {
        self.lock().pending_nonce = nonce;
        self
    }

    pub fn with_members<I: IntoIterator<Item = Address>>(self, members: I) -> Self {
        {
            let mut l = self.lock();
            for a in members {
                if !l.members.contains(&a) {
                    l.members.push(a);
                }
            }
        }
        self
    }

    /// How long a submitted transaction stays in the pool before
    /// `wait_mined` returns.
    pub fn with_mine_delay(mut self, delay: Duration) -> Self {
        self.mine_delay = delay;
        self
    }

    // --- fault injection -------------------------------------------------

    /// Every submission for `address` is refused with `message`.
    pub fn reject_submissions_for(&self, address: Address, message: &str) {
        self.lock().reject.insert(address, message.to_string());
    }

    /// Transactions for `address` are mined with a failed receipt.
    pub fn revert_for(&self, address: Address) {
        self.lock().revert.insert(address);
    }

    pub fn fail_role_checks_for(&self, address: Address) {
        self.lock().role_check_failures.insert(address);
    }

    pub fn fail_member_read(&self, index: u64) {
        self.lock().member_read_failures.insert(index);
    }

    pub fn set_nonce_unreachable(&self, unreachable: bool) {
        self.lock().nonce_unreachable = unreachable;
    }

    /// The next `n` submissions each lose a race against a transaction sent
    /// from outside the process: that transaction takes the pending nonce and
    /// the submission is rejected as contention.
    pub fn race_external_senders(&self, n: usize) {
        self.lock().external_races += n;
    }

    /// A transaction sent from outside the process consumes the pending nonce.
    pub fn send_external(&self) -> u64 {
        let mut l = self.lock();
        let n = l.pending_nonce;
        l.pending_nonce += 1;
        l.external_nonces.push(n);
        n
    }

    // --- observation -----------------------------------------------------

    /// Nonces consumed by this signer's accepted submissions, sorted.
    pub fn used_nonces(&self) -> Vec<u64> {
        let mut v = self.lock().used_nonces.clone();
        v.sort_unstable();
        v
    }

    pub fn external_nonces(&self) -> Vec<u64> {
        self.lock().external_nonces.clone()
    }

    /// Every `send_role_change` call, accepted or not.
    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn accepted_count(&self) -> usize {
        self.lock().used_nonces.len()
    }

    /// Highest number of accepted-but-not-yet-mined transactions seen at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn holds_role(&self, address: Address) -> bool {
        self.lock().members.contains(&address)
    }

    /// Current members, sorted.
    pub fn members(&self) -> Vec<Address> {
        let mut v = self.lock().members.clone();
        v.sort();
        v
    }

    pub fn chain_pending_nonce(&self) -> u64 {
        self.lock().pending_nonce
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn tx_hash_for(nonce: u64, req: &RoleChangeRequest) -> TxHash {
    let mut h = [0u8; 32];
    h[..20].copy_from_slice(req.address.as_bytes());
    h[20] = match req.intent {
        RoleIntent::Grant => 1,
        RoleIntent::Revoke => 2,
    };
    h[24..].copy_from_slice(&nonce.to_be_bytes());
    TxHash(h)
}

#[async_trait]
impl ChainClient for MockChain {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError> {
        let l = self.lock();
        if l.nonce_unreachable {
            return Err(ChainError::Transport("connection refused".into()));
        }
        if account != self.signer {
            return Ok(0);
        }
        Ok(l.pending_nonce)
    }

    async fn has_role(&self, account: Address) -> Result<bool, ChainError> {
        let l = self.lock();
        if l.role_check_failures.contains(&account) {
            return Err(ChainError::Transport(format!("eth_call hasRole({account}) timed out")));
        }
        Ok(l.members.contains(&account))
    }

    async fn role_member_count(&self) -> Result<u64, ChainError> {
        Ok(self.lock().members.len() as u64)
    }

    async fn role_member(&self, index: u64) -> Result<Address, ChainError> {
        let l = self.lock();
        if l.member_read_failures.contains(&index) {
            return Err(ChainError::Transport(format!("getRoleMember({index}) failed")));
        }
        l.members
            .get(index as usize)
            .copied()
            .ok_or_else(|| ChainError::Rejected {
                code: Some(3),
                message: "execution reverted: index out of bounds".into(),
            })
    }

    async fn send_role_change(
        &self,
        request: &RoleChangeRequest,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let mut l = self.lock();

        if let Some(msg) = l.reject.get(&request.address) {
            return Err(ChainError::Rejected {
                code: Some(-32000),
                message: msg.clone(),
            });
        }
        if l.external_races > 0 && nonce == l.pending_nonce {
            l.external_races -= 1;
            let taken = l.pending_nonce;
            l.pending_nonce += 1;
            l.external_nonces.push(taken);
        }
        if nonce < l.pending_nonce {
            return Err(ChainError::NonceContention(REPLACEMENT_UNDERPRICED.into()));
        }
        if nonce > l.pending_nonce {
            return Err(ChainError::Rejected {
                code: Some(-32000),
                message: format!("nonce gap: pending {} got {nonce}", l.pending_nonce),
            });
        }

        l.pending_nonce += 1;
        l.used_nonces.push(nonce);
        let hash = tx_hash_for(nonce, request);
        l.in_pool.insert(hash, (*request, nonce));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(hash)
    }

    async fn wait_mined(&self, tx: TxHash) -> Result<Receipt, ChainError> {
        if self.mine_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.mine_delay).await;
        }

        let mut l = self.lock();
        if let Some(r) = l.mined.get(&tx) {
            return Ok(r.clone());
        }
        let Some((req, _nonce)) = l.in_pool.remove(&tx) else {
            return Err(ChainError::Rejected {
                code: None,
                message: format!("unknown transaction {tx}"),
            });
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        l.block += 1;
        let status = if l.revert.contains(&req.address) {
            ReceiptStatus::Failed
        } else {
            match req.intent {
                RoleIntent::Grant => {
                    if !l.members.contains(&req.address) {
                        l.members.push(req.address);
                    }
                }
                RoleIntent::Revoke => {
                    if let Some(i) = l.members.iter().position(|a| *a == req.address) {
                        l.members.swap_remove(i);
                    }
                }
            }
            ReceiptStatus::Success
        };
        let receipt = Receipt {
            tx_hash: tx,
            status,
            block_number: Some(l.block),
            gas_used: Some(45_000),
        };
        l.mined.insert(tx, receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[tokio::test]
    async fn enforces_nonce_order() {
        let chain = MockChain::new().with_pending_nonce(5);
        let req = RoleChangeRequest::grant(addr(1));

        assert!(matches!(
            chain.send_role_change(&req, 4).await,
            Err(ChainError::NonceContention(_))
        ));
        assert!(matches!(
            chain.send_role_change(&req, 6).await,
            Err(ChainError::Rejected { .. })
        ));
        let tx = chain.send_role_change(&req, 5).await.unwrap();
        assert!(matches!(
            chain.send_role_change(&req, 5).await,
            Err(ChainError::NonceContention(_))
        ));

        assert!(!chain.holds_role(addr(1)));
        let r = chain.wait_mined(tx).await.unwrap();
        assert!(r.is_success());
        assert!(chain.holds_role(addr(1)));
        assert_eq!(chain.used_nonces(), vec![5]);
        assert_eq!(chain.submission_count(), 4);
    }

    #[tokio::test]
    async fn external_race_takes_the_nonce() {
        let chain = MockChain::new().with_pending_nonce(2);
        chain.race_external_senders(1);
        let req = RoleChangeRequest::grant(addr(1));
        assert!(matches!(
            chain.send_role_change(&req, 2).await,
            Err(ChainError::NonceContention(_))
        ));
        assert_eq!(chain.external_nonces(), vec![2]);
        chain.send_role_change(&req, 3).await.unwrap();
        assert_eq!(chain.used_nonces(), vec![3]);
    }

    #[tokio::test]
    async fn revoke_swap_removes_member() {
        let chain = MockChain::new().with_members([addr(1), addr(2), addr(3)]);
        let tx = chain
            .send_role_change(&RoleChangeRequest::revoke(addr(1)), 0)
            .await
            .unwrap();
        chain.wait_mined(tx).await.unwrap();
        assert_eq!(chain.role_member_count().await.unwrap(), 2);
        assert_eq!(chain.role_member(0).await.unwrap(), addr(3));
        assert!(chain.role_member(2).await.is_err());
    }
}
