// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - NODE CONTEXT
//
// The shared state every protocol service works against: ledger, pools,
// chain tip, and the atomic height/sync flags. Block application is
// serialized by one lock; no two blocks are ever applied concurrently,
// and rollback takes the same lock.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::NetworkError;
use sgy_consensus::{
    check_block_and_transfer_funds, AcceptAllOracles, ApplyError, BlockValidator, NoVotes,
    OracleVerifier, SchemeVoteRegistry,
};
use sgy_core::block::Block;
use sgy_core::state::ChainState;
use sgy_core::transaction::{Transaction, TxData};
use sgy_core::SHIFT_TO_PAST_IN_RESET;
use sgy_ledger::LedgerStore;
use sgy_mempool::{MempoolSet, Routed};
use std::sync::{Arc, Mutex, RwLock};

pub struct NodeContext {
    pub ledger: Arc<LedgerStore>,
    pub mempool: Arc<MempoolSet>,
    pub state: Arc<ChainState>,
    pub oracles: Arc<dyn OracleVerifier>,
    pub votes: Arc<dyn SchemeVoteRegistry>,
    tip: RwLock<Block>,
    apply_lock: Mutex<()>,
}

impl NodeContext {
    /// Context starting from `tip` (the genesis block on a fresh node, or
    /// the last stored block on restart).
    pub fn new(ledger: Arc<LedgerStore>, mempool: Arc<MempoolSet>, tip: Block) -> Self {
        let state = Arc::new(ChainState::new());
        state.set_height(tip.height());
        Self {
            ledger,
            mempool,
            state,
            oracles: Arc::new(AcceptAllOracles),
            votes: Arc::new(NoVotes),
            tip: RwLock::new(tip),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn with_collaborators(
        mut self,
        oracles: Arc<dyn OracleVerifier>,
        votes: Arc<dyn SchemeVoteRegistry>,
    ) -> Self {
        self.oracles = oracles;
        self.votes = votes;
        self
    }

    pub fn tip(&self) -> Block {
        self.tip.read().expect("tip lock poisoned").clone()
    }

    /// Validate and apply one block on top of the current tip. `strict`
    /// re-verifies transaction signatures; the sync and full-block gossip
    /// paths pass false, relying on the Merkle root.
    pub fn try_apply_block(
        &self,
        block: &Block,
        txs: &[Transaction],
        strict: bool,
    ) -> Result<(), ApplyError> {
        let _guard = self.apply_lock.lock().expect("apply lock poisoned");
        let last = self.tip();
        let validator = BlockValidator {
            oracles: self.oracles.as_ref(),
            votes: self.votes.as_ref(),
            syncing: self.state.is_syncing(),
        };
        validator.check_base_block(block, &last, false)?;
        check_block_and_transfer_funds(
            &self.ledger,
            Some(&self.mempool),
            block,
            txs,
            &last,
            strict,
        )?;
        *self.tip.write().expect("tip lock poisoned") = block.clone();
        self.state.set_height(block.height());
        Ok(())
    }

    /// Fork recovery: discard local state back to
    /// `divergence_height - SHIFT_TO_PAST_IN_RESET` and re-enter sync
    /// mode. Returns the height the node now sits at. Always moves to a
    /// height strictly below the divergence point.
    pub fn shift_to_past(&self, divergence_height: i64) -> Result<i64, NetworkError> {
        let _guard = self.apply_lock.lock().expect("apply lock poisoned");
        let target = (divergence_height - SHIFT_TO_PAST_IN_RESET).max(0);
        let landed = self.ledger.rollback_to(target)?;
        let db = self.ledger.db().ok_or(NetworkError::NoDatabase)?;
        let block = db
            .block_by_height(landed)?
            .ok_or(NetworkError::MissingBlock(landed))?;
        *self.tip.write().expect("tip lock poisoned") = block;
        self.state.set_height(landed);
        self.state.set_syncing(true);
        log::warn!(
            "shift to past: divergence at {}, chain reset to {}",
            divergence_height,
            landed
        );
        Ok(landed)
    }

    /// Entry point for transactions arriving over gossip or RPC: verify,
    /// persist as pending, and route into the pools. Multisign proposals
    /// that complete quorum are promoted to the standard pool.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Routed, NetworkError> {
        tx.check_shape().map_err(NetworkError::Protocol)?;
        if !tx.verify_signature() {
            return Err(NetworkError::TxRejected("bad signature"));
        }
        if tx.is_nonce_proposal() {
            return Err(NetworkError::TxRejected("nonce proposals are not pooled"));
        }

        let sender_account = self.ledger.get_account(&tx.sender);
        let main_sender_account = match &tx.data {
            TxData::MultiSignApprove { main_hash } => self
                .mempool
                .get(main_hash)
                .and_then(|main| self.ledger.get_account(&main.sender)),
            _ => None,
        };

        let routed = self.mempool.submit(
            tx.clone(),
            sender_account.as_ref(),
            main_sender_account.as_ref(),
            self.state.height(),
        );
        match routed {
            Routed::Rejected(reason) => Err(NetworkError::TxRejected(reason)),
            Routed::Quorum(main) => {
                self.mempool.enqueue_standard((*main).clone());
                Ok(Routed::Quorum(main))
            }
            other => {
                if let Some(db) = self.ledger.db() {
                    db.put_pending_transaction(&tx)?;
                }
                Ok(other)
            }
        }
    }

    /// Sender-signed cancellation: remove a still-pending transaction
    /// from the pools and the pending store.
    pub fn cancel_transaction(
        &self,
        hash: &sgy_core::TxHash,
        requester: &sgy_core::Address,
    ) -> Result<bool, NetworkError> {
        let Some(tx) = self.mempool.get(hash) else {
            return Ok(false);
        };
        if tx.sender != *requester {
            return Err(NetworkError::TxRejected("only the sender may cancel"));
        }
        self.mempool.remove_by_hash(hash);
        if let Some(db) = self.ledger.db() {
            db.remove_pending_transaction(hash)?;
        }
        Ok(true)
    }
}
