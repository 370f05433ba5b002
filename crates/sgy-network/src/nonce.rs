// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - NONCE SERVICE (BLOCK-PROPOSAL GOSSIP)
//
// Every round, nodes broadcast a signed nonce transaction for height h+1
// carrying their view of the tip plus oracle samples. On receiving one
// from a sufficiently staked operational account, an operator node
// assembles a candidate block and broadcasts it only if its header
// already satisfies the Proof of Synergy. There is no search loop: the
// signature is the only free variable, so whoever's header happens to
// satisfy the inequality proposes.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::context::NodeContext;
use crate::envelope::*;
use crate::error::NetworkError;
use crate::transport::Transport;
use rand::Rng;
use sgy_consensus::applicator::{compute_block_reward, DeltaLedger};
use sgy_consensus::proof::valid_proof;
use sgy_core::block::{adjust_difficulty, Block};
use sgy_core::merkle::MerkleTree;
use sgy_core::transaction::{NonceData, Transaction, TxData};
use sgy_core::{
    Address, BlockHash, TxHash, BLOCK_INTERVAL_SECS, MAX_TRANSACTIONS_IN_BLOCK,
    MIN_STAKING_FOR_NODE,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A node that may produce blocks: the delegate slot it operates and the
/// operator signing key.
pub struct OperatorIdentity {
    pub slot: u8,
    pub keypair: sgy_crypto::KeyPair,
    /// Operator share of the reward, in thousandths.
    pub reward_percentage: i32,
}

pub struct NonceService<T: Transport> {
    ctx: Arc<NodeContext>,
    transport: Arc<T>,
    local_id: String,
    identity: Option<OperatorIdentity>,
    /// Latest oracle samples seen per proposal height.
    samples: RwLock<HashMap<i64, (i64, i64)>>,
}

impl<T: Transport> NonceService<T> {
    pub fn new(
        ctx: Arc<NodeContext>,
        transport: Arc<T>,
        local_id: &str,
        identity: Option<OperatorIdentity>,
    ) -> Self {
        Self {
            ctx,
            transport,
            local_id: local_id.to_string(),
            identity,
            samples: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_operator(&self) -> bool {
        self.identity.is_some()
    }

    /// Broadcast this round's nonce transaction. Only operator nodes
    /// participate in proposal rounds.
    pub fn broadcast_nonce(&self, timestamp: i64) -> Result<Option<Transaction>, NetworkError> {
        let Some(identity) = &self.identity else {
            return Ok(None);
        };
        if self.ctx.state.is_syncing() {
            return Ok(None);
        }
        let tip = self.ctx.tip();
        let mut rng = rand::thread_rng();
        let data = NonceData {
            height: tip.height() + 1,
            previous_hash: tip.block_hash,
            // Pseudo-random placeholder samples until real oracle feeds
            // are wired through the OracleVerifier seam
            price_oracle: rng.gen_range(1..1_000_000),
            rand_oracle: rng.gen(),
            vote_data: Vec::new(),
        };
        let sender = Address::from_public_key(&identity.keypair.public_key);
        let mut tx = Transaction {
            sender,
            recipient: sender,
            amount: 0,
            fee: 0,
            height: tip.height() + 1,
            timestamp,
            data: TxData::NonceProposal(data),
            public_key: vec![],
            signature: vec![],
            hash: BlockHash::ZERO,
        };
        tx.sign(&identity.keypair)?;

        let msg = GossipMessage::new(HEAD_NN).put(KEY_TRANSACTIONS, bincode::serialize(&tx)?);
        self.transport.broadcast(&self.local_id, &msg);
        Ok(Some(tx))
    }

    pub fn handle_nonce(&self, msg: &GossipMessage) -> Result<Option<Block>, NetworkError> {
        let raw = msg
            .first(&KEY_TRANSACTIONS)
            .ok_or_else(|| NetworkError::Protocol("nn without transaction".to_string()))?;
        let tx: Transaction = bincode::deserialize(raw)?;
        self.process_nonce_transaction(&tx)
    }

    /// Validate a round message and, if this node operates a slot,
    /// attempt a proposal. Returns the proposed block when one was
    /// accepted and broadcast.
    pub fn process_nonce_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<Option<Block>, NetworkError> {
        let TxData::NonceProposal(data) = &tx.data else {
            return Err(NetworkError::TxRejected("not a nonce proposal"));
        };
        if !tx.verify_signature() {
            return Err(NetworkError::TxRejected("bad signature"));
        }

        let tip = self.ctx.tip();
        if data.height != tip.height() + 1 || data.previous_hash != tip.block_hash {
            // A view of a different tip; ignore, sync will reconcile
            return Ok(None);
        }
        if !self.sender_is_operational(&tx.sender)? {
            return Err(NetworkError::TxRejected(
                "nonce sender is not a staked operational account",
            ));
        }

        self.samples
            .write()
            .expect("samples lock poisoned")
            .insert(data.height, (data.price_oracle, data.rand_oracle));

        // Proposal bodies are never pooled; stash this one so a "bl"
        // announce of the round's block can resolve it locally.
        if let Some(db) = self.ctx.ledger.db() {
            db.put_pending_transaction(tx)?;
        }

        let Some(identity) = &self.identity else {
            return Ok(None);
        };
        // Our own eligibility is re-checked every round: stake moves
        let our_address = Address::from_public_key(&identity.keypair.public_key);
        let (_, total, operational) = self
            .ctx
            .ledger
            .get_staked_in_delegated_account(identity.slot)?;
        if total < MIN_STAKING_FOR_NODE || operational != Some(our_address) {
            return Ok(None);
        }

        let (block, txs) = self.assemble_candidate(&tip, tx, data, identity)?;
        if !valid_proof(&block.base.block_header_hash, block.base.header.difficulty) {
            log::debug!(
                "header for height {} does not satisfy the proof, yielding this round",
                block.height()
            );
            return Ok(None);
        }

        self.ctx.try_apply_block(&block, &txs, false)?;
        let announce = GossipMessage::new(HEAD_BL).put(KEY_BLOCK, bincode::serialize(&block)?);
        self.transport.broadcast(&self.local_id, &announce);
        log::info!("proposed block at height {}", block.height());
        Ok(Some(block))
    }

    fn sender_is_operational(&self, sender: &Address) -> Result<bool, NetworkError> {
        for slot in 1..=u8::MAX {
            let (_, total, operational) =
                self.ctx.ledger.get_staked_in_delegated_account(slot)?;
            if operational == Some(*sender) {
                return Ok(total >= MIN_STAKING_FOR_NODE);
            }
        }
        Ok(false)
    }

    /// Candidate block: mempool transactions that compose against the
    /// ledger, the round's nonce transaction last, header fields derived
    /// from the tip and the embedded oracle samples.
    fn assemble_candidate(
        &self,
        last: &Block,
        nonce_tx: &Transaction,
        data: &NonceData,
        identity: &OperatorIdentity,
    ) -> Result<(Block, Vec<Transaction>), NetworkError> {
        let mut delta = DeltaLedger::new(&self.ctx.ledger);
        let mut txs: Vec<Transaction> = Vec::new();
        for tx in self
            .ctx
            .mempool
            .peek_standard(MAX_TRANSACTIONS_IN_BLOCK - 1)
        {
            if tx.check_shape().is_err() {
                continue;
            }
            if delta.apply(&tx, last.height() + 1).is_ok() {
                txs.push(tx);
            }
        }
        txs.push(nonce_tx.clone());

        let hashes: Vec<TxHash> = txs.iter().map(|t| t.hash).collect();
        let block_fee: i64 = txs.iter().map(|t| t.fee).sum();

        let mut block = last.clone();
        block.base.header.previous_hash = last.block_hash;
        block.base.header.height = last.height() + 1;
        block.base.header.difficulty = adjust_difficulty(
            last.base.header.difficulty,
            nonce_tx.timestamp - last.base.timestamp,
            BLOCK_INTERVAL_SECS,
        );
        block.base.header.delegated_account = Address::delegate(identity.slot);
        block.base.header.operator_account =
            Address::from_public_key(&identity.keypair.public_key);
        block.base.header.root_merkle_tree = MerkleTree::build(&hashes).root();
        block.base.timestamp = nonce_tx.timestamp;
        block.base.reward_percentage = identity.reward_percentage;
        block.base.supply = last.base.supply + compute_block_reward(last.base.supply);
        block.base.price_oracle = data.price_oracle;
        block.base.rand_oracle = data.rand_oracle;
        block.base.oracle_proof_price = Vec::new();
        block.base.oracle_proof_rand = Vec::new();
        block.transaction_hashes = hashes;
        block.block_fee = block_fee;
        block.base.header.sign(&identity.keypair)?;
        block.seal();
        Ok((block, txs))
    }

    /// Latest recorded oracle samples for a proposal height.
    pub fn samples_for(&self, height: i64) -> Option<(i64, i64)> {
        self.samples
            .read()
            .expect("samples lock poisoned")
            .get(&height)
            .copied()
    }
}
