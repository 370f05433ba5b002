// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - GENERIC TRANSACTION POOL
//
// One bounded pool implementation serves the standard, escrow, and
// multisign pools — what differs between them is routing and release
// policy, which lives in the MempoolSet, not here.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use sgy_core::transaction::Transaction;
use sgy_core::TxHash;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug)]
pub struct TxPool {
    name: &'static str,
    capacity: usize,
    transactions: HashMap<TxHash, Transaction>,
    /// FIFO insertion order; peeks walk it oldest-first.
    order: VecDeque<TxHash>,
    /// Negative cache: a banned hash is rejected on resubmission forever.
    banned: HashSet<TxHash>,
}

impl TxPool {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            transactions: HashMap::new(),
            order: VecDeque::new(),
            banned: HashSet::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add under `key`. Returns false (state unchanged) if the key is
    /// already present, banned, or the pool is full.
    pub fn add_transaction(&mut self, tx: Transaction, key: TxHash) -> bool {
        if self.banned.contains(&key) {
            log::debug!("{} pool: rejecting banned transaction {}", self.name, key);
            return false;
        }
        if self.transactions.contains_key(&key) {
            return false;
        }
        if self.transactions.len() >= self.capacity {
            log::warn!("{} pool full ({}), dropping {}", self.name, self.capacity, key);
            return false;
        }
        self.transactions.insert(key, tx);
        self.order.push_back(key);
        true
    }

    /// Up to `limit` transactions in insertion order. A positive
    /// `height_filter` restricts to transactions with that target height
    /// (the escrow-release path peeks by height bucket).
    pub fn peek_transactions(&self, limit: usize, height_filter: i64) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|h| self.transactions.get(h))
            .filter(|tx| height_filter <= 0 || tx.height == height_filter)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn remove_transaction_by_hash(&mut self, hash: &TxHash) -> Option<Transaction> {
        let removed = self.transactions.remove(hash);
        if removed.is_some() {
            self.order.retain(|h| h != hash);
        }
        removed
    }

    /// Permanent removal: also poisons the hash so it can never re-enter.
    pub fn ban_transaction_by_hash(&mut self, hash: &TxHash) -> Option<Transaction> {
        self.banned.insert(*hash);
        self.remove_transaction_by_hash(hash)
    }

    pub fn is_banned(&self, hash: &TxHash) -> bool {
        self.banned.contains(hash)
    }

    pub fn transaction_exists(&self, hash: &TxHash) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn get(&self, hash: &TxHash) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn number_of_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Remove and return every transaction matching `pred`, preserving
    /// insertion order in the result.
    pub fn drain_matching<F: Fn(&Transaction) -> bool>(&mut self, pred: F) -> Vec<Transaction> {
        let hashes: Vec<TxHash> = self
            .order
            .iter()
            .filter(|h| self.transactions.get(h).map(&pred).unwrap_or(false))
            .copied()
            .collect();
        hashes
            .into_iter()
            .filter_map(|h| self.remove_transaction_by_hash(&h))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|h| self.transactions.get(h))
    }
}
