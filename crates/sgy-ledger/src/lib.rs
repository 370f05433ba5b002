// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - LEDGER STORE
//
// The replicated account state: balance accounts, staking accounts (one
// map per delegate slot), and DEX accounts, each behind its own
// read/write lock. Every mutation is a full read-modify-write under the
// exclusive lock; readers share the lock. Snapshots are persisted under a
// height key on every block commit, and rollback reloads the nearest
// stored snapshot at or below the requested height.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use sgy_core::{Address, TxHash};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

pub mod account;
pub mod error;
pub mod staking;
pub mod store;

pub use account::Account;
pub use error::LedgerError;
pub use staking::{LockedStake, StakingAccount, StakingDetail};
pub use store::ChainDb;

/// DEX-side account. Order matching runs in the external engine; the core
/// ledger only tracks the balances parked there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexAccount {
    pub address: Address,
    pub balance: i64,
}

/// Delegate slots are 1..=255; index 0 is never used.
const SLOT_COUNT: usize = 256;

pub struct LedgerStore {
    accounts: RwLock<HashMap<Address, Account>>,
    staking: RwLock<Vec<HashMap<Address, StakingAccount>>>,
    dex: RwLock<HashMap<Address, DexAccount>>,
    db: Option<Arc<ChainDb>>,
}

impl LedgerStore {
    /// Volatile store, for tests and tools.
    pub fn in_memory() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            staking: RwLock::new(vec![HashMap::new(); SLOT_COUNT]),
            dex: RwLock::new(HashMap::new()),
            db: None,
        }
    }

    /// Store backed by the chain database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = Arc::new(ChainDb::open(path)?);
        Ok(Self::with_db(db))
    }

    pub fn with_db(db: Arc<ChainDb>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            staking: RwLock::new(vec![HashMap::new(); SLOT_COUNT]),
            dex: RwLock::new(HashMap::new()),
            db: Some(db),
        }
    }

    pub fn db(&self) -> Option<&Arc<ChainDb>> {
        self.db.as_ref()
    }

    // ── Balance accounts ────────────────────────────────────────────

    pub fn get_balance(&self, addr: &Address) -> i64 {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .get(addr)
            .map(|a| a.balance)
            .unwrap_or(0)
    }

    pub fn set_balance(&self, addr: Address, balance: i64) {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        accounts.entry(addr).or_insert_with(|| Account::new(addr)).balance = balance;
    }

    /// Adjust a balance by `delta`, creating the account lazily. Fails
    /// without committing anything if the result would be negative.
    pub fn add_balance(&self, addr: Address, delta: i64) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        let account = accounts.entry(addr).or_insert_with(|| Account::new(addr));
        let next = account.balance + delta;
        if next < 0 {
            return Err(LedgerError::InsufficientFunds {
                account: addr,
                balance: account.balance,
                needed: -delta,
            });
        }
        account.balance = next;
        Ok(())
    }

    pub fn get_account(&self, addr: &Address) -> Option<Account> {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .get(addr)
            .cloned()
    }

    pub fn set_account(&self, account: Account) {
        self.accounts
            .write()
            .expect("ledger lock poisoned")
            .insert(account.address, account);
    }

    pub fn set_transaction_delay(&self, addr: Address, delay: i64) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        accounts
            .entry(addr)
            .or_insert_with(|| Account::new(addr))
            .set_transaction_delay(delay)
    }

    pub fn set_multi_sign(
        &self,
        addr: Address,
        number: u8,
        addresses: Vec<Address>,
    ) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        accounts
            .entry(addr)
            .or_insert_with(|| Account::new(addr))
            .set_multi_sign(number, addresses)
    }

    /// Append a confirmed transaction hash to both parties' histories.
    pub fn record_transaction(&self, sender: Address, recipient: Address, hash: TxHash) {
        let mut accounts = self.accounts.write().expect("ledger lock poisoned");
        accounts
            .entry(sender)
            .or_insert_with(|| Account::new(sender))
            .sent_tx_hashes
            .push(hash);
        accounts
            .entry(recipient)
            .or_insert_with(|| Account::new(recipient))
            .received_tx_hashes
            .push(hash);
    }

    // ── DEX accounts ────────────────────────────────────────────────

    pub fn get_dex_account(&self, addr: &Address) -> Option<DexAccount> {
        self.dex.read().expect("dex lock poisoned").get(addr).cloned()
    }

    pub fn set_dex_account(&self, account: DexAccount) {
        self.dex
            .write()
            .expect("dex lock poisoned")
            .insert(account.address, account);
    }

    // ── Staking ─────────────────────────────────────────────────────

    fn check_slot(slot: u8) -> Result<usize, LedgerError> {
        if slot == 0 {
            return Err(LedgerError::InvalidDelegateSlot(slot));
        }
        Ok(slot as usize)
    }

    /// Stake into a delegate slot. A deposit with no release schedule
    /// (`release_per_block == 0`) claims the slot's operational-account
    /// status if nobody holds it yet — first claim wins, decided under the
    /// exclusive lock so concurrent claimants cannot both succeed.
    pub fn stake(
        &self,
        slot: u8,
        staker: Address,
        amount: i64,
        release_per_block: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let idx = Self::check_slot(slot)?;
        let mut staking = self.staking.write().expect("staking lock poisoned");
        let slot_taken = staking[idx].values().any(|s| s.operational_account);
        let entry = staking[idx]
            .entry(staker)
            .or_insert_with(|| StakingAccount::new(slot, staker));
        entry.stake(amount, release_per_block, height, timestamp)?;
        if release_per_block == 0 && !slot_taken {
            entry.operational_account = true;
        }
        Ok(())
    }

    /// Unstake (`amount` negative). The staking account keeps its audit
    /// history even at zero balance.
    pub fn unstake(
        &self,
        slot: u8,
        staker: Address,
        amount: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let idx = Self::check_slot(slot)?;
        let mut staking = self.staking.write().expect("staking lock poisoned");
        let entry = staking[idx]
            .get_mut(&staker)
            .ok_or(LedgerError::InsufficientStakedBalance {
                available: 0,
                needed: -amount,
            })?;
        entry.unstake(amount, height, timestamp)
    }

    pub fn reward(
        &self,
        slot: u8,
        staker: Address,
        amount: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let idx = Self::check_slot(slot)?;
        let mut staking = self.staking.write().expect("staking lock poisoned");
        let entry = staking[idx]
            .entry(staker)
            .or_insert_with(|| StakingAccount::new(slot, staker));
        entry.reward(amount, height, timestamp)
    }

    pub fn withdraw_reward(
        &self,
        slot: u8,
        staker: Address,
        amount: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let idx = Self::check_slot(slot)?;
        let mut staking = self.staking.write().expect("staking lock poisoned");
        let entry = staking[idx]
            .get_mut(&staker)
            .ok_or(LedgerError::InsufficientRewards {
                available: 0,
                needed: -amount,
            })?;
        entry.withdraw_reward(amount, height, timestamp)
    }

    pub fn get_staking_account(&self, slot: u8, staker: &Address) -> Option<StakingAccount> {
        let idx = Self::check_slot(slot).ok()?;
        self.staking.read().expect("staking lock poisoned")[idx]
            .get(staker)
            .cloned()
    }

    /// Everything staked in a delegate slot: the accounts, the total, and
    /// the operational account if one is claimed.
    pub fn get_staked_in_delegated_account(
        &self,
        slot: u8,
    ) -> Result<(Vec<StakingAccount>, i64, Option<Address>), LedgerError> {
        let idx = Self::check_slot(slot)?;
        let staking = self.staking.read().expect("staking lock poisoned");
        let accounts: Vec<StakingAccount> = staking[idx].values().cloned().collect();
        let total = accounts.iter().map(|s| s.staked_balance).sum();
        let operational = accounts
            .iter()
            .find(|s| s.operational_account)
            .map(|s| s.address);
        Ok((accounts, total, operational))
    }

    // ── Supply aggregation ──────────────────────────────────────────

    pub fn get_supply_in_accounts(&self) -> i64 {
        self.accounts
            .read()
            .expect("ledger lock poisoned")
            .values()
            .map(|a| a.balance)
            .sum()
    }

    pub fn get_supply_staked(&self) -> i64 {
        self.staking
            .read()
            .expect("staking lock poisoned")
            .iter()
            .flat_map(|slot| slot.values())
            .map(|s| s.staked_balance)
            .sum()
    }

    pub fn get_supply_rewards(&self) -> i64 {
        self.staking
            .read()
            .expect("staking lock poisoned")
            .iter()
            .flat_map(|slot| slot.values())
            .map(|s| s.staking_rewards)
            .sum()
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Snapshot every map under `height`. Called once per committed block.
    pub fn commit(&self, height: i64) -> Result<(), LedgerError> {
        let Some(db) = &self.db else { return Ok(()) };
        {
            let accounts = self.accounts.read().expect("ledger lock poisoned");
            db.save_accounts(height, &accounts)?;
        }
        {
            let staking = self.staking.read().expect("staking lock poisoned");
            for (idx, slot_map) in staking.iter().enumerate().skip(1) {
                if !slot_map.is_empty() {
                    db.save_staking(height, idx as u8, slot_map)?;
                }
            }
        }
        {
            let dex = self.dex.read().expect("dex lock poisoned");
            db.save_dex(height, &dex)?;
        }
        Ok(())
    }

    /// Load the snapshot at `height`, or the latest one when `height < 0`.
    /// Returns the height actually loaded.
    pub fn load(&self, height: i64) -> Result<i64, LedgerError> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| LedgerError::Storage("no database attached".to_string()))?;
        let target = if height < 0 {
            db.last_snapshot_height()?
                .ok_or(LedgerError::SnapshotNotFound(height))?
        } else {
            height
        };
        let accounts = db
            .load_accounts(target)?
            .ok_or(LedgerError::SnapshotNotFound(target))?;
        *self.accounts.write().expect("ledger lock poisoned") = accounts;

        let mut staking = self.staking.write().expect("staking lock poisoned");
        for (idx, slot_map) in staking.iter_mut().enumerate() {
            *slot_map = if idx == 0 {
                HashMap::new()
            } else {
                db.load_staking(target, idx as u8)?.unwrap_or_default()
            };
        }
        drop(staking);

        *self.dex.write().expect("dex lock poisoned") =
            db.load_dex(target)?.unwrap_or_default();
        Ok(target)
    }

    /// Rollback: reload the nearest snapshot at or below `height` and
    /// discard every stored block above it. Returns the height the ledger
    /// now reflects. Only the sync protocol's shift-to-past path calls
    /// this, always with a height strictly below the divergence point.
    pub fn rollback_to(&self, height: i64) -> Result<i64, LedgerError> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| LedgerError::Storage("no database attached".to_string()))?;
        let snapshot_height = db.snapshot_at_or_below(height.max(0))?;
        let loaded = self.load(snapshot_height)?;
        db.truncate_blocks_above(loaded)?;
        log::warn!(
            "ledger rolled back to height {} (requested {})",
            loaded,
            height
        );
        Ok(loaded)
    }
}
