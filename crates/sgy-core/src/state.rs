// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - CHAIN STATE ATOMICS
//
// Node-wide height and sync flag. These are the only two pieces of shared
// state that are read on every hot path, so they are lock-free atomics
// rather than fields behind the ledger lock.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

#[derive(Debug)]
pub struct ChainState {
    height: AtomicI64,
    syncing: AtomicBool,
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainState {
    pub fn new() -> Self {
        Self {
            height: AtomicI64::new(-1),
            syncing: AtomicBool::new(false),
        }
    }

    /// Current committed height; -1 before genesis is applied.
    pub fn height(&self) -> i64 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn set_height(&self, height: i64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// True while local height trails the best known network height.
    /// While set, the validator relaxes oracle/governance re-validation
    /// (sync-replayed blocks already passed those when first produced).
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }
}
