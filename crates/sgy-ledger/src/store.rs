// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - PERSISTENT CHAIN STORAGE
//
// sled embedded database holding every logical table: height-keyed ledger
// snapshots (accounts, staking ×255 delegate slots, DEX accounts), blocks
// indexed by hash and by height, Merkle trees, and the pending/confirmed
// transaction stores. Values are bincode.
//
// Key layout: fixed tree per table, key = big-endian height; the staking
// table appends the delegate-slot byte. The last stored height is found by
// linear forward probing until the first miss.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::account::Account;
use crate::error::LedgerError;
use crate::staking::StakingAccount;
use crate::DexAccount;
use sgy_core::block::Block;
use sgy_core::merkle::MerkleTree;
use sgy_core::transaction::Transaction;
use sgy_core::{Address, BlockHash, TxHash};
use sled::Tree;
use std::collections::HashMap;
use std::path::Path;

const TREE_ACCOUNTS: &str = "accounts";
const TREE_STAKING: &str = "staking";
const TREE_DEX: &str = "dex";
const TREE_BLOCKS_BY_HASH: &str = "blocks_by_hash";
const TREE_BLOCKS_BY_HEIGHT: &str = "blocks_by_height";
const TREE_MERKLE: &str = "merkle_trees";
const TREE_PENDING_TX: &str = "pending_transactions";
const TREE_CONFIRMED_TX: &str = "confirmed_transactions";

fn height_key(height: i64) -> [u8; 8] {
    (height as u64).to_be_bytes()
}

fn staking_key(height: i64, slot: u8) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[..8].copy_from_slice(&height_key(height));
    key[8] = slot;
    key
}

/// One handle over every persistent table.
pub struct ChainDb {
    db: sled::Db,
    accounts: Tree,
    staking: Tree,
    dex: Tree,
    blocks_by_hash: Tree,
    blocks_by_height: Tree,
    merkle: Tree,
    pending_tx: Tree,
    confirmed_tx: Tree,
}

impl ChainDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::open(path.as_ref())?;
        Ok(Self {
            accounts: db.open_tree(TREE_ACCOUNTS)?,
            staking: db.open_tree(TREE_STAKING)?,
            dex: db.open_tree(TREE_DEX)?,
            blocks_by_hash: db.open_tree(TREE_BLOCKS_BY_HASH)?,
            blocks_by_height: db.open_tree(TREE_BLOCKS_BY_HEIGHT)?,
            merkle: db.open_tree(TREE_MERKLE)?,
            pending_tx: db.open_tree(TREE_PENDING_TX)?,
            confirmed_tx: db.open_tree(TREE_CONFIRMED_TX)?,
            db,
        })
    }

    /// Flush all trees; called on graceful shutdown.
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }

    // ── Ledger snapshots ────────────────────────────────────────────

    pub fn save_accounts(
        &self,
        height: i64,
        accounts: &HashMap<Address, Account>,
    ) -> Result<(), LedgerError> {
        self.accounts
            .insert(height_key(height), bincode::serialize(accounts)?)?;
        Ok(())
    }

    pub fn load_accounts(
        &self,
        height: i64,
    ) -> Result<Option<HashMap<Address, Account>>, LedgerError> {
        match self.accounts.get(height_key(height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_staking(
        &self,
        height: i64,
        slot: u8,
        stakers: &HashMap<Address, StakingAccount>,
    ) -> Result<(), LedgerError> {
        self.staking
            .insert(staking_key(height, slot), bincode::serialize(stakers)?)?;
        Ok(())
    }

    pub fn load_staking(
        &self,
        height: i64,
        slot: u8,
    ) -> Result<Option<HashMap<Address, StakingAccount>>, LedgerError> {
        match self.staking.get(staking_key(height, slot))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_dex(
        &self,
        height: i64,
        dex: &HashMap<Address, DexAccount>,
    ) -> Result<(), LedgerError> {
        self.dex.insert(height_key(height), bincode::serialize(dex)?)?;
        Ok(())
    }

    pub fn load_dex(
        &self,
        height: i64,
    ) -> Result<Option<HashMap<Address, DexAccount>>, LedgerError> {
        match self.dex.get(height_key(height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Last height with an account snapshot: forward probe from 0 until
    /// the first miss. Only runs at startup and after rollback, so the
    /// linear scan is acceptable.
    pub fn last_snapshot_height(&self) -> Result<Option<i64>, LedgerError> {
        let mut height: i64 = 0;
        while self.accounts.contains_key(height_key(height))? {
            height += 1;
        }
        if height == 0 {
            Ok(None)
        } else {
            Ok(Some(height - 1))
        }
    }

    /// Nearest snapshot at or below `height` (backward probe). Used by the
    /// shift-to-past rollback, which must land on a stored state.
    pub fn snapshot_at_or_below(&self, height: i64) -> Result<i64, LedgerError> {
        let mut h = height;
        while h >= 0 {
            if self.accounts.contains_key(height_key(h))? {
                return Ok(h);
            }
            h -= 1;
        }
        Err(LedgerError::SnapshotNotFound(height))
    }

    // ── Blocks ──────────────────────────────────────────────────────

    /// Store a block under both indexes. Blocks are immutable: re-inserting
    /// the same height during normal operation is a logic error upstream,
    /// but rollback legitimately overwrites.
    pub fn put_block(&self, block: &Block) -> Result<(), LedgerError> {
        let bytes = bincode::serialize(block)?;
        self.blocks_by_hash.insert(block.block_hash.as_bytes(), bytes)?;
        self.blocks_by_height
            .insert(height_key(block.height()), block.block_hash.as_bytes())?;
        Ok(())
    }

    pub fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>, LedgerError> {
        match self.blocks_by_hash.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block_by_height(&self, height: i64) -> Result<Option<Block>, LedgerError> {
        if height < 0 {
            return Ok(None);
        }
        match self.blocks_by_height.get(height_key(height))? {
            Some(hash_bytes) => {
                let hash = BlockHash::from_slice(&hash_bytes)
                    .ok_or_else(|| LedgerError::Storage("corrupt height index".to_string()))?;
                self.block_by_hash(&hash)
            }
            None => Ok(None),
        }
    }

    pub fn last_block_height(&self) -> Result<Option<i64>, LedgerError> {
        let mut height: i64 = 0;
        while self.blocks_by_height.contains_key(height_key(height))? {
            height += 1;
        }
        if height == 0 {
            Ok(None)
        } else {
            Ok(Some(height - 1))
        }
    }

    /// Discard every block strictly above `height`. The shift-to-past
    /// rollback is the only caller.
    pub fn truncate_blocks_above(&self, height: i64) -> Result<(), LedgerError> {
        let mut h = height + 1;
        while let Some(hash_bytes) = self.blocks_by_height.remove(height_key(h))? {
            self.blocks_by_hash.remove(&hash_bytes)?;
            self.merkle.remove(height_key(h))?;
            h += 1;
        }
        Ok(())
    }

    pub fn save_merkle_tree(&self, height: i64, tree: &MerkleTree) -> Result<(), LedgerError> {
        self.merkle.insert(height_key(height), bincode::serialize(tree)?)?;
        Ok(())
    }

    pub fn merkle_tree(&self, height: i64) -> Result<Option<MerkleTree>, LedgerError> {
        match self.merkle.get(height_key(height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Transactions ────────────────────────────────────────────────

    pub fn put_pending_transaction(&self, tx: &Transaction) -> Result<(), LedgerError> {
        self.pending_tx.insert(tx.hash.as_bytes(), bincode::serialize(tx)?)?;
        Ok(())
    }

    pub fn pending_transaction(&self, hash: &TxHash) -> Result<Option<Transaction>, LedgerError> {
        match self.pending_tx.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn remove_pending_transaction(&self, hash: &TxHash) -> Result<(), LedgerError> {
        self.pending_tx.remove(hash.as_bytes())?;
        Ok(())
    }

    pub fn put_confirmed_transaction(&self, tx: &Transaction) -> Result<(), LedgerError> {
        self.confirmed_tx.insert(tx.hash.as_bytes(), bincode::serialize(tx)?)?;
        Ok(())
    }

    pub fn confirmed_transaction(
        &self,
        hash: &TxHash,
    ) -> Result<Option<Transaction>, LedgerError> {
        match self.confirmed_tx.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Migrate the given hashes from pending to confirmed storage. Hashes
    /// absent from pending are skipped — sync-replayed blocks carry
    /// transactions this node never pooled.
    pub fn confirm_transactions(&self, hashes: &[TxHash]) -> Result<usize, LedgerError> {
        let mut moved = 0;
        for hash in hashes {
            if let Some(bytes) = self.pending_tx.remove(hash.as_bytes())? {
                self.confirmed_tx.insert(hash.as_bytes(), bytes)?;
                moved += 1;
            }
        }
        Ok(moved)
    }
}
