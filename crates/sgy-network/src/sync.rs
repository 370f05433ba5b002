// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - CHAIN SYNC PROTOCOL
//
// Height/hash announces ("hi"), block range requests ("gh"/"sh") with
// their "bx" body backfill, and missing-transaction recovery ("st"/"bt").
// Fork handling is "shift to past": when a peer's chain contradicts an
// already-stored block, local state is discarded back below the
// divergence point and re-synced.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::context::NodeContext;
use crate::envelope::*;
use crate::error::NetworkError;
use crate::transport::{PeerRegistry, Transport};
use sgy_core::block::Block;
use sgy_core::transaction::Transaction;
use sgy_core::{BlockHash, NUMBER_OF_HASHES_IN_BUCKET};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub struct SyncService<T: Transport> {
    ctx: Arc<NodeContext>,
    transport: Arc<T>,
    peers: Arc<PeerRegistry>,
    local_id: String,
    /// Highest height any peer has announced.
    best_seen: AtomicI64,
}

impl<T: Transport> SyncService<T> {
    pub fn new(
        ctx: Arc<NodeContext>,
        transport: Arc<T>,
        peers: Arc<PeerRegistry>,
        local_id: &str,
    ) -> Self {
        Self {
            ctx,
            transport,
            peers,
            local_id: local_id.to_string(),
            best_seen: AtomicI64::new(-1),
        }
    }

    pub fn best_seen(&self) -> i64 {
        self.best_seen.load(Ordering::SeqCst)
    }

    /// Periodic height/tip announce, piggy-backing the peer list.
    pub fn announce(&self) {
        let tip = self.ctx.tip();
        let peers: Vec<Vec<u8>> = self
            .peers
            .snapshot()
            .into_iter()
            .map(|p| p.into_bytes())
            .collect();
        let msg = GossipMessage::new(HEAD_HI)
            .put_i64(KEY_LOCAL_HEIGHT, self.ctx.state.height())
            .put(KEY_LOCAL_BEST, tip.block_hash.as_bytes().to_vec())
            .put_many(KEY_PEERS, peers);
        self.transport.broadcast(&self.local_id, &msg);
    }

    pub fn handle_hi(&self, from: &str, msg: &GossipMessage) -> Result<(), NetworkError> {
        let their_height = msg
            .get_i64(&KEY_LOCAL_HEIGHT)
            .ok_or_else(|| NetworkError::Protocol("hi without height".to_string()))?;
        let their_best: [u8; 32] = msg
            .first(&KEY_LOCAL_BEST)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| NetworkError::Protocol("hi without tip hash".to_string()))?;

        // Opportunistic peer discovery, bounded by the registry cap
        self.peers.add(from);
        for raw in msg.items(&KEY_PEERS) {
            if let Ok(peer) = std::str::from_utf8(raw) {
                if peer != self.local_id {
                    self.peers.add(peer);
                }
            }
        }

        self.best_seen.fetch_max(their_height, Ordering::SeqCst);
        let our_height = self.ctx.state.height();

        if their_height == our_height {
            if BlockHash(their_best) != self.ctx.tip().block_hash {
                log::warn!("fork with {} at height {}", from, our_height);
                self.ctx.shift_to_past(our_height)?;
                self.request_range(from, self.ctx.state.height() + 1, their_height);
            } else if self.ctx.state.is_syncing() {
                self.ctx.state.set_syncing(false);
            }
        } else if their_height > our_height {
            self.ctx.state.set_syncing(true);
            let end = their_height.min(our_height + NUMBER_OF_HASHES_IN_BUCKET);
            self.request_range(from, our_height + 1, end);
        }
        // We are ahead: nothing to do, the peer catches up on its own
        Ok(())
    }

    fn request_range(&self, peer: &str, begin: i64, end: i64) {
        if begin > end {
            return;
        }
        let msg = GossipMessage::new(HEAD_GH)
            .put_i64(KEY_BEGIN_HEIGHT, begin)
            .put_i64(KEY_END_HEIGHT, end);
        self.transport.send_to(&self.local_id, peer, &msg);
    }

    /// Serve a block range, clamped to the bucket size and our height.
    /// The "sh" reply pairs heights and encoded blocks positionally; the
    /// transaction bodies travel ahead of it in a "bx" backfill so the
    /// receiver can apply without a second round trip in the common case.
    pub fn handle_gh(&self, from: &str, msg: &GossipMessage) -> Result<(), NetworkError> {
        let begin = msg
            .get_i64(&KEY_BEGIN_HEIGHT)
            .ok_or_else(|| NetworkError::Protocol("gh without begin".to_string()))?;
        let end = msg
            .get_i64(&KEY_END_HEIGHT)
            .ok_or_else(|| NetworkError::Protocol("gh without end".to_string()))?;
        let db = self.ctx.ledger.db().ok_or(NetworkError::NoDatabase)?;

        let begin = begin.max(0);
        let end = end
            .min(begin + NUMBER_OF_HASHES_IN_BUCKET - 1)
            .min(self.ctx.state.height());

        let mut heights = Vec::new();
        let mut blocks = Vec::new();
        let mut txs = Vec::new();
        for height in begin..=end {
            let Some(block) = db.block_by_height(height)? else {
                break;
            };
            for hash in &block.transaction_hashes {
                if let Some(tx) = db.confirmed_transaction(hash)? {
                    txs.push(bincode::serialize(&tx)?);
                }
            }
            heights.push(height.to_le_bytes().to_vec());
            blocks.push(bincode::serialize(&block)?);
        }

        if !txs.is_empty() {
            let bodies = GossipMessage::new(HEAD_BX).put_many(KEY_TRANSACTIONS, txs);
            self.transport.send_to(&self.local_id, from, &bodies);
        }
        let reply = GossipMessage::new(HEAD_SH)
            .put_many(KEY_ITEM_HEIGHTS, heights)
            .put_many(KEY_BLOCK_VALUES, blocks);
        self.transport.send_to(&self.local_id, from, &reply);
        Ok(())
    }

    /// Verify and apply a received block range in order. Transaction
    /// bodies arrive ahead of the range in a "bx" backfill and are
    /// resolved from the pools and the pending store. A contradiction
    /// with an already-stored block triggers shift-to-past; a missing
    /// transaction triggers a backfill request and stops the range (the
    /// next announce retries); an apply failure stops at the last good
    /// block.
    pub fn handle_sh(&self, from: &str, msg: &GossipMessage) -> Result<(), NetworkError> {
        let db = self.ctx.ledger.db().ok_or(NetworkError::NoDatabase)?;
        let heights = msg.items(&KEY_ITEM_HEIGHTS);
        let raw_blocks = msg.items(&KEY_BLOCK_VALUES);
        if heights.len() != raw_blocks.len() {
            return Err(NetworkError::Protocol(format!(
                "sh with {} heights but {} blocks",
                heights.len(),
                raw_blocks.len()
            )));
        }
        let mut blocks = Vec::with_capacity(raw_blocks.len());
        for (raw_height, raw_block) in heights.iter().zip(raw_blocks) {
            let bytes: [u8; 8] = raw_height
                .as_slice()
                .try_into()
                .map_err(|_| NetworkError::Protocol("sh with malformed height".to_string()))?;
            let height = i64::from_le_bytes(bytes);
            let block: Block = bincode::deserialize(raw_block)?;
            if block.height() != height {
                return Err(NetworkError::Protocol(format!(
                    "sh pairs height {} with a block at height {}",
                    height,
                    block.height()
                )));
            }
            blocks.push(block);
        }
        blocks.sort_by_key(|b| b.height());

        for block in blocks {
            let height = block.height();
            if height <= self.ctx.state.height() {
                match db.block_by_height(height)? {
                    Some(stored) if stored.block_hash == block.block_hash => continue,
                    _ => {
                        self.ctx.shift_to_past(height)?;
                        return Ok(());
                    }
                }
            }

            let mut txs = Vec::with_capacity(block.transaction_hashes.len());
            let mut missing = Vec::new();
            for hash in &block.transaction_hashes {
                let found = self
                    .ctx
                    .mempool
                    .get(hash)
                    .or_else(|| db.pending_transaction(hash).ok().flatten());
                match found {
                    Some(tx) => txs.push(tx),
                    None => missing.push(hash.as_bytes().to_vec()),
                }
            }
            if !missing.is_empty() {
                log::info!(
                    "block {} references {} unknown transactions, requesting backfill",
                    height,
                    missing.len()
                );
                let request = GossipMessage::new(HEAD_ST).put_many(KEY_TRANSACTIONS, missing);
                self.transport.send_to(&self.local_id, from, &request);
                return Ok(());
            }

            if let Err(err) = self.ctx.try_apply_block(&block, &txs, false) {
                log::error!("sync apply failed at height {}: {}", height, err);
                return Ok(());
            }
        }

        if self.ctx.state.height() >= self.best_seen() {
            self.ctx.state.set_syncing(false);
        } else {
            let begin = self.ctx.state.height() + 1;
            let end = self.best_seen().min(begin + NUMBER_OF_HASHES_IN_BUCKET - 1);
            self.request_range(from, begin, end);
        }
        Ok(())
    }

    /// Serve a missing-transaction request from pools and stores.
    pub fn handle_st(&self, from: &str, msg: &GossipMessage) -> Result<(), NetworkError> {
        let mut found = Vec::new();
        for raw in msg.items(&KEY_TRANSACTIONS) {
            let Ok(bytes) = <[u8; 32]>::try_from(raw.as_slice()) else {
                continue;
            };
            let hash = BlockHash(bytes);
            let tx = self.ctx.mempool.get(&hash).or_else(|| {
                self.ctx.ledger.db().and_then(|db| {
                    db.pending_transaction(&hash)
                        .ok()
                        .flatten()
                        .or_else(|| db.confirmed_transaction(&hash).ok().flatten())
                })
            });
            if let Some(tx) = tx {
                found.push(tx);
            }
        }
        let mut reply = GossipMessage::new(HEAD_BT);
        for tx in &found {
            reply = reply.put(KEY_TRANSACTIONS, bincode::serialize(tx)?);
        }
        self.transport.send_to(&self.local_id, from, &reply);
        Ok(())
    }

    /// Stash backfilled transactions in the pending store so the next
    /// range retry can resolve them.
    pub fn handle_bt(&self, msg: &GossipMessage) -> Result<(), NetworkError> {
        self.stash_bodies(msg)
    }

    /// Sync-time transaction bodies sent ahead of an "sh" range. These
    /// skip signature re-verification: inclusion is proven by the block's
    /// Merkle root when the range applies, so only the hash binding is
    /// checked here.
    pub fn handle_bx(&self, msg: &GossipMessage) -> Result<(), NetworkError> {
        self.stash_bodies(msg)
    }

    fn stash_bodies(&self, msg: &GossipMessage) -> Result<(), NetworkError> {
        let db = self.ctx.ledger.db().ok_or(NetworkError::NoDatabase)?;
        for raw in msg.items(&KEY_TRANSACTIONS) {
            let tx: Transaction = bincode::deserialize(raw)?;
            if tx.hash != tx.compute_hash() {
                log::warn!("backfilled transaction with bad hash, dropped");
                continue;
            }
            db.put_pending_transaction(&tx)?;
        }
        Ok(())
    }
}
