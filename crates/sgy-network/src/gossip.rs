// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - TRANSACTION AND BLOCK GOSSIP
//
// "tx" floods individual transactions; "bl" floods sealed blocks, body
// only. Receivers resolve the transaction set from their own pools (the
// bodies already travelled over "tx" or "nn") and fall back to an "st"
// request. Resolved blocks are applied without re-verifying individual
// transaction signatures: the Merkle root binds the set, and every
// transaction was signature-checked when it first entered a pool.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::context::NodeContext;
use crate::envelope::*;
use crate::error::NetworkError;
use crate::transport::Transport;
use sgy_core::block::Block;
use sgy_core::transaction::Transaction;
use std::sync::Arc;

pub struct GossipService<T: Transport> {
    ctx: Arc<NodeContext>,
    transport: Arc<T>,
    local_id: String,
}

impl<T: Transport> GossipService<T> {
    pub fn new(ctx: Arc<NodeContext>, transport: Arc<T>, local_id: &str) -> Self {
        Self {
            ctx,
            transport,
            local_id: local_id.to_string(),
        }
    }

    pub fn broadcast_transaction(&self, tx: &Transaction) -> Result<(), NetworkError> {
        let msg = GossipMessage::new(HEAD_TX).put(KEY_TRANSACTIONS, bincode::serialize(tx)?);
        self.transport.broadcast(&self.local_id, &msg);
        Ok(())
    }

    /// A rejection here is not an error at the protocol level: gossip
    /// floods produce duplicates by design.
    pub fn handle_tx(&self, msg: &GossipMessage) -> Result<(), NetworkError> {
        for raw in msg.items(&KEY_TRANSACTIONS) {
            let tx: Transaction = bincode::deserialize(raw)?;
            let hash = tx.hash;
            match self.ctx.submit_transaction(tx) {
                Ok(routed) => log::debug!("gossip transaction {} routed {:?}", hash, routed),
                Err(NetworkError::TxRejected(reason)) => {
                    log::debug!("gossip transaction {} dropped: {}", hash, reason)
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    pub fn broadcast_block(&self, block: &Block) -> Result<(), NetworkError> {
        let msg = GossipMessage::new(HEAD_BL).put(KEY_BLOCK, bincode::serialize(block)?);
        self.transport.broadcast(&self.local_id, &msg);
        Ok(())
    }

    /// Apply a gossiped block on top of the local tip, resolving its
    /// transactions from the pools and the pending store. A block from
    /// the future flips the node into sync mode and requests the gap
    /// instead.
    pub fn handle_bl(&self, from: &str, msg: &GossipMessage) -> Result<(), NetworkError> {
        let raw = msg
            .first(&KEY_BLOCK)
            .ok_or_else(|| NetworkError::Protocol("bl without block".to_string()))?;
        let block: Block = bincode::deserialize(raw)?;

        let our_height = self.ctx.state.height();
        if block.height() <= our_height {
            return Ok(()); // stale announce
        }
        if block.height() > our_height + 1 {
            log::info!(
                "block {} is ahead of local height {}, entering sync",
                block.height(),
                our_height
            );
            self.ctx.state.set_syncing(true);
            let msg = GossipMessage::new(HEAD_GH)
                .put_i64(KEY_BEGIN_HEIGHT, our_height + 1)
                .put_i64(KEY_END_HEIGHT, block.height());
            self.transport.send_to(&self.local_id, from, &msg);
            return Ok(());
        }

        let mut txs = Vec::with_capacity(block.transaction_hashes.len());
        let mut missing = Vec::new();
        for hash in &block.transaction_hashes {
            let found = self.ctx.mempool.get(hash).or_else(|| {
                self.ctx
                    .ledger
                    .db()
                    .and_then(|db| db.pending_transaction(hash).ok().flatten())
            });
            match found {
                Some(tx) => txs.push(tx),
                None => missing.push(hash.as_bytes().to_vec()),
            }
        }
        if !missing.is_empty() {
            let request = GossipMessage::new(HEAD_ST).put_many(KEY_TRANSACTIONS, missing);
            self.transport.send_to(&self.local_id, from, &request);
            return Ok(());
        }

        match self.ctx.try_apply_block(&block, &txs, false) {
            Ok(()) => {
                log::info!("accepted block {} at height {}", block.block_hash, block.height());
            }
            Err(err) => log::warn!("rejected gossiped block at {}: {}", block.height(), err),
        }
        Ok(())
    }
}
