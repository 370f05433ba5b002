// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - MEMPOOL SET
//
// Three pools over one generic implementation: standard (ready to mine),
// escrow (waiting out the sender's mandatory delay), and multisign
// (waiting for co-signer quorum). A transaction hash lives in at most one
// pool at a time; it may migrate escrow → multisign as conditions clear,
// never the other way.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod pool;

pub use pool::TxPool;

use sgy_core::transaction::{Transaction, TxData};
use sgy_core::{Address, TxHash, MULTISIGN_MAX_AGE_BLOCKS, POOL_CAPACITY};
use sgy_ledger::Account;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Where `submit` routed a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Ready for block inclusion.
    Standard,
    /// Parked until the sender's escrow delay elapses.
    Escrow,
    /// Parked as a multisign proposal awaiting quorum.
    MultiSign,
    /// Counted as an approval vote for the given pending proposal.
    Approval { main: TxHash },
    /// Approval vote that completed quorum: the main transaction is
    /// released for execution and purged from the pool.
    Quorum(Box<Transaction>),
    /// Dropped: duplicate, banned, or pool full.
    Rejected(&'static str),
}

/// Per-proposal multisign bookkeeping, kept beside the pool entry.
#[derive(Debug, Clone)]
struct MultiSignMeta {
    first_seen_height: i64,
    approvers: HashSet<Address>,
}

pub struct MempoolSet {
    standard: RwLock<TxPool>,
    escrow: RwLock<TxPool>,
    multisign: RwLock<TxPool>,
    multisign_meta: RwLock<HashMap<TxHash, MultiSignMeta>>,
}

impl Default for MempoolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MempoolSet {
    pub fn new() -> Self {
        Self {
            standard: RwLock::new(TxPool::new("standard", POOL_CAPACITY)),
            escrow: RwLock::new(TxPool::new("escrow", POOL_CAPACITY)),
            multisign: RwLock::new(TxPool::new("multisign", POOL_CAPACITY)),
            multisign_meta: RwLock::new(HashMap::new()),
        }
    }

    /// Route an incoming transaction.
    ///
    /// `sender_account` is the sender's ledger state at submission time
    /// (None for a never-seen sender, which routes standard). Approval
    /// votes additionally need the MAIN sender's account to check the
    /// co-signer list, supplied by `main_sender_account`.
    pub fn submit(
        &self,
        tx: Transaction,
        sender_account: Option<&Account>,
        main_sender_account: Option<&Account>,
        current_height: i64,
    ) -> Routed {
        if self.is_banned(&tx.hash) {
            return Routed::Rejected("banned");
        }
        if self.transaction_exists(&tx.hash) {
            return Routed::Rejected("duplicate");
        }

        // An approval vote references an existing pending proposal; it is
        // never pooled itself.
        if let TxData::MultiSignApprove { main_hash } = &tx.data {
            return match self.record_approval(&tx, *main_hash, main_sender_account) {
                Ok(Some(main)) => Routed::Quorum(Box::new(main)),
                Ok(None) => Routed::Approval { main: *main_hash },
                Err(reason) => Routed::Rejected(reason),
            };
        }

        match sender_account {
            Some(acct) if acct.is_escrow() => {
                if self.escrow.write().expect("escrow lock").add_transaction(tx.clone(), tx.hash) {
                    Routed::Escrow
                } else {
                    Routed::Rejected("escrow pool refused")
                }
            }
            Some(acct) if acct.is_multi_sign() => self.pool_as_multisign(tx, current_height),
            _ => {
                if self
                    .standard
                    .write()
                    .expect("standard lock")
                    .add_transaction(tx.clone(), tx.hash)
                {
                    Routed::Standard
                } else {
                    Routed::Rejected("standard pool refused")
                }
            }
        }
    }

    fn pool_as_multisign(&self, tx: Transaction, current_height: i64) -> Routed {
        let hash = tx.hash;
        if self
            .multisign
            .write()
            .expect("multisign lock")
            .add_transaction(tx, hash)
        {
            self.multisign_meta.write().expect("meta lock").insert(
                hash,
                MultiSignMeta {
                    first_seen_height: current_height,
                    approvers: HashSet::new(),
                },
            );
            Routed::MultiSign
        } else {
            Routed::Rejected("multisign pool refused")
        }
    }

    /// Count an approval vote. Returns the main transaction once distinct
    /// approvers reach the account's quorum.
    fn record_approval(
        &self,
        approval: &Transaction,
        main_hash: TxHash,
        main_sender_account: Option<&Account>,
    ) -> Result<Option<Transaction>, &'static str> {
        let main_account = main_sender_account.ok_or("unknown multisign account")?;
        if !main_account.is_multi_sign() {
            return Err("account is not multisign");
        }
        if !main_account.multi_sign_addresses.contains(&approval.sender) {
            return Err("approver not in co-signer list");
        }

        let mut multisign = self.multisign.write().expect("multisign lock");
        if !multisign.transaction_exists(&main_hash) {
            return Err("no pending proposal for approval");
        }

        let mut meta_map = self.multisign_meta.write().expect("meta lock");
        let meta = meta_map.get_mut(&main_hash).ok_or("proposal metadata missing")?;
        meta.approvers.insert(approval.sender);

        if meta.approvers.len() >= main_account.multi_sign_number as usize {
            meta_map.remove(&main_hash);
            let main = multisign
                .remove_transaction_by_hash(&main_hash)
                .ok_or("proposal vanished")?;
            log::info!("multisign quorum reached for {}", main_hash);
            return Ok(Some(main));
        }
        Ok(None)
    }

    /// Peel off escrow transactions whose delay has elapsed:
    /// `tx.height + sender_delay ≤ current_height`. Each released
    /// transaction is returned for immediate execution, unless the sender
    /// has meanwhile become multisign, in which case it migrates to the
    /// multisign pool instead.
    pub fn release_due_escrow<F>(&self, current_height: i64, account_of: F) -> Vec<Transaction>
    where
        F: Fn(&Address) -> Option<Account>,
    {
        let due = self.escrow.write().expect("escrow lock").drain_matching(|tx| {
            let delay = account_of(&tx.sender)
                .map(|a| a.transaction_delay)
                .unwrap_or(0);
            tx.height + delay <= current_height
        });

        let mut ready = Vec::new();
        for tx in due {
            let now_multisign = account_of(&tx.sender)
                .map(|a| a.is_multi_sign())
                .unwrap_or(false);
            if now_multisign {
                self.pool_as_multisign(tx, current_height);
            } else {
                ready.push(tx);
            }
        }
        ready
    }

    /// Purge multisign proposals that aged out without quorum. Returns the
    /// purged hashes so the caller can report the no-quorum condition.
    pub fn purge_stale_multisign(&self, current_height: i64) -> Vec<TxHash> {
        let stale: Vec<TxHash> = {
            let meta = self.multisign_meta.read().expect("meta lock");
            meta.iter()
                .filter(|(_, m)| m.first_seen_height + MULTISIGN_MAX_AGE_BLOCKS < current_height)
                .map(|(h, _)| *h)
                .collect()
        };
        if stale.is_empty() {
            return stale;
        }
        let mut multisign = self.multisign.write().expect("multisign lock");
        let mut meta_map = self.multisign_meta.write().expect("meta lock");
        for hash in &stale {
            multisign.remove_transaction_by_hash(hash);
            meta_map.remove(hash);
            log::warn!("multisign proposal {} purged: no quorum after {} blocks", hash, MULTISIGN_MAX_AGE_BLOCKS);
        }
        stale
    }

    /// Put a transaction straight into the standard pool, bypassing
    /// account routing. Used for escrow transactions whose delay has
    /// elapsed: re-routing them through `submit` would park them in the
    /// escrow pool again.
    pub fn enqueue_standard(&self, tx: Transaction) -> bool {
        let hash = tx.hash;
        self.standard
            .write()
            .expect("standard lock")
            .add_transaction(tx, hash)
    }

    /// Highest-priority standard transactions for block assembly.
    pub fn peek_standard(&self, limit: usize) -> Vec<Transaction> {
        self.standard.read().expect("standard lock").peek_transactions(limit, 0)
    }

    /// Remove a transaction wherever it lives (block inclusion, sender
    /// cancellation).
    pub fn remove_by_hash(&self, hash: &TxHash) -> Option<Transaction> {
        if let Some(tx) = self.standard.write().expect("standard lock").remove_transaction_by_hash(hash) {
            return Some(tx);
        }
        if let Some(tx) = self.escrow.write().expect("escrow lock").remove_transaction_by_hash(hash) {
            return Some(tx);
        }
        let removed = self.multisign.write().expect("multisign lock").remove_transaction_by_hash(hash);
        if removed.is_some() {
            self.multisign_meta.write().expect("meta lock").remove(hash);
        }
        removed
    }

    /// Ban a transaction in every pool (invalidity, not inclusion).
    pub fn ban_by_hash(&self, hash: &TxHash) {
        self.standard.write().expect("standard lock").ban_transaction_by_hash(hash);
        self.escrow.write().expect("escrow lock").ban_transaction_by_hash(hash);
        self.multisign.write().expect("multisign lock").ban_transaction_by_hash(hash);
        self.multisign_meta.write().expect("meta lock").remove(hash);
    }

    pub fn transaction_exists(&self, hash: &TxHash) -> bool {
        self.standard.read().expect("standard lock").transaction_exists(hash)
            || self.escrow.read().expect("escrow lock").transaction_exists(hash)
            || self.multisign.read().expect("multisign lock").transaction_exists(hash)
    }

    pub fn get(&self, hash: &TxHash) -> Option<Transaction> {
        if let Some(tx) = self.standard.read().expect("standard lock").get(hash) {
            return Some(tx.clone());
        }
        if let Some(tx) = self.escrow.read().expect("escrow lock").get(hash) {
            return Some(tx.clone());
        }
        self.multisign.read().expect("multisign lock").get(hash).cloned()
    }

    pub fn is_banned(&self, hash: &TxHash) -> bool {
        self.standard.read().expect("standard lock").is_banned(hash)
            || self.escrow.read().expect("escrow lock").is_banned(hash)
            || self.multisign.read().expect("multisign lock").is_banned(hash)
    }

    /// (standard, escrow, multisign) sizes.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.standard.read().expect("standard lock").number_of_transactions(),
            self.escrow.read().expect("escrow lock").number_of_transactions(),
            self.multisign.read().expect("multisign lock").number_of_transactions(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgy_core::BlockHash;

    fn keypair(seed: u8) -> sgy_crypto::KeyPair {
        sgy_crypto::keypair_from_seed(&[seed; 32])
    }

    fn signed_tx(seed: u8, height: i64, data: TxData) -> Transaction {
        let kp = keypair(seed);
        let mut tx = Transaction {
            sender: Address::from_public_key(&kp.public_key),
            recipient: Address([0xbb; 20]),
            amount: 100,
            fee: 1,
            height,
            timestamp: height,
            data,
            public_key: vec![],
            signature: vec![],
            hash: BlockHash::ZERO,
        };
        tx.sign(&kp).unwrap();
        tx
    }

    fn plain_account(addr: Address) -> Account {
        Account::new(addr)
    }

    fn escrow_account(addr: Address, delay: i64) -> Account {
        let mut a = Account::new(addr);
        a.set_transaction_delay(delay).unwrap();
        a
    }

    fn multisign_account(addr: Address, n: u8, cosigners: Vec<Address>) -> Account {
        let mut a = Account::new(addr);
        a.set_multi_sign(n, cosigners).unwrap();
        a
    }

    #[test]
    fn test_plain_sender_routes_standard() {
        let pools = MempoolSet::new();
        let tx = signed_tx(1, 5, TxData::Transfer);
        let acct = plain_account(tx.sender);
        assert_eq!(pools.submit(tx.clone(), Some(&acct), None, 5), Routed::Standard);
        assert_eq!(pools.counts(), (1, 0, 0));
    }

    #[test]
    fn test_duplicate_submit_rejected() {
        let pools = MempoolSet::new();
        let tx = signed_tx(1, 5, TxData::Transfer);
        pools.submit(tx.clone(), None, None, 5);
        assert_eq!(
            pools.submit(tx, None, None, 5),
            Routed::Rejected("duplicate")
        );
    }

    #[test]
    fn test_exclusivity_across_pools() {
        let pools = MempoolSet::new();
        let tx = signed_tx(1, 5, TxData::Transfer);
        let escrow = escrow_account(tx.sender, 50);
        pools.submit(tx.clone(), Some(&escrow), None, 5);
        assert_eq!(pools.counts(), (0, 1, 0));
        // Same hash cannot enter another pool
        assert!(matches!(
            pools.submit(tx, Some(&plain_account(Address([1; 20]))), None, 5),
            Routed::Rejected(_)
        ));
        assert_eq!(pools.counts(), (0, 1, 0));
    }

    #[test]
    fn test_escrow_release_at_exact_height() {
        // Account with delay 50; transaction targeting height 10 releases
        // at height 60, not before.
        let pools = MempoolSet::new();
        let tx = signed_tx(1, 10, TxData::Transfer);
        let acct = escrow_account(tx.sender, 50);
        pools.submit(tx.clone(), Some(&acct), None, 10);

        let held = pools.release_due_escrow(59, |_| Some(acct.clone()));
        assert!(held.is_empty());
        assert_eq!(pools.counts(), (0, 1, 0));

        let released = pools.release_due_escrow(60, |_| Some(acct.clone()));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].hash, tx.hash);
        assert_eq!(pools.counts(), (0, 0, 0));
    }

    #[test]
    fn test_escrow_release_hands_off_to_multisign() {
        let pools = MempoolSet::new();
        let tx = signed_tx(1, 10, TxData::Transfer);
        let escrow = escrow_account(tx.sender, 5);
        pools.submit(tx.clone(), Some(&escrow), None, 10);

        // By release time the sender switched to multisign
        let cosigner = Address([2; 20]);
        let msign = multisign_account(tx.sender, 1, vec![cosigner]);
        let released = pools.release_due_escrow(20, |_| Some(msign.clone()));
        assert!(released.is_empty());
        assert_eq!(pools.counts(), (0, 0, 1));
    }

    #[test]
    fn test_multisign_quorum_flow() {
        let pools = MempoolSet::new();
        let main_tx = signed_tx(1, 5, TxData::Transfer);

        let approver1 = keypair(2);
        let approver2 = keypair(3);
        let a1 = Address::from_public_key(&approver1.public_key);
        let a2 = Address::from_public_key(&approver2.public_key);
        let acct = multisign_account(main_tx.sender, 2, vec![a1, a2]);

        assert_eq!(
            pools.submit(main_tx.clone(), Some(&acct), None, 5),
            Routed::MultiSign
        );

        let approval1 = signed_tx(2, 6, TxData::MultiSignApprove { main_hash: main_tx.hash });
        assert_eq!(
            pools.submit(approval1, None, Some(&acct), 6),
            Routed::Approval { main: main_tx.hash }
        );

        let approval2 = signed_tx(3, 6, TxData::MultiSignApprove { main_hash: main_tx.hash });
        match pools.submit(approval2, None, Some(&acct), 6) {
            Routed::Quorum(main) => assert_eq!(main.hash, main_tx.hash),
            other => panic!("expected quorum, got {:?}", other),
        }
        assert_eq!(pools.counts(), (0, 0, 0));
    }

    #[test]
    fn test_duplicate_approver_does_not_count_twice() {
        let pools = MempoolSet::new();
        let main_tx = signed_tx(1, 5, TxData::Transfer);
        let approver = keypair(2);
        let a1 = Address::from_public_key(&approver.public_key);
        let acct = multisign_account(main_tx.sender, 2, vec![a1, Address([9; 20])]);
        pools.submit(main_tx.clone(), Some(&acct), None, 5);

        for height in [6, 7] {
            let approval =
                signed_tx(2, height, TxData::MultiSignApprove { main_hash: main_tx.hash });
            let routed = pools.submit(approval, None, Some(&acct), height);
            assert!(matches!(routed, Routed::Approval { .. }), "got {:?}", routed);
        }
        // Still pending: two votes from one address are one approver
        assert_eq!(pools.counts(), (0, 0, 1));
    }

    #[test]
    fn test_foreign_approver_rejected() {
        let pools = MempoolSet::new();
        let main_tx = signed_tx(1, 5, TxData::Transfer);
        let acct = multisign_account(main_tx.sender, 1, vec![Address([7; 20])]);
        pools.submit(main_tx.clone(), Some(&acct), None, 5);

        let stranger = signed_tx(4, 6, TxData::MultiSignApprove { main_hash: main_tx.hash });
        assert_eq!(
            pools.submit(stranger, None, Some(&acct), 6),
            Routed::Rejected("approver not in co-signer list")
        );
    }

    #[test]
    fn test_stale_multisign_purged_not_retried() {
        let pools = MempoolSet::new();
        let main_tx = signed_tx(1, 5, TxData::Transfer);
        let acct = multisign_account(main_tx.sender, 2, vec![Address([7; 20]), Address([8; 20])]);
        pools.submit(main_tx.clone(), Some(&acct), None, 5);

        let purged = pools.purge_stale_multisign(5 + MULTISIGN_MAX_AGE_BLOCKS);
        assert!(purged.is_empty(), "not stale yet");

        let purged = pools.purge_stale_multisign(5 + MULTISIGN_MAX_AGE_BLOCKS + 1);
        assert_eq!(purged, vec![main_tx.hash]);
        assert_eq!(pools.counts(), (0, 0, 0));
    }

    #[test]
    fn test_ban_is_global_across_pools() {
        let pools = MempoolSet::new();
        let tx = signed_tx(1, 5, TxData::Transfer);
        pools.submit(tx.clone(), None, None, 5);
        pools.ban_by_hash(&tx.hash);
        assert!(!pools.transaction_exists(&tx.hash));
        assert_eq!(pools.submit(tx, None, None, 5), Routed::Rejected("banned"));
    }
}
