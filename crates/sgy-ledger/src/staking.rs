// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - STAKING ACCOUNTS
//
// One StakingAccount per (delegate slot, staker address). Locked amounts
// decay linearly per block and are pruned at zero. Every state change
// records an audit entry keyed by block height.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use sgy_core::{Address, MIN_STAKING_USER};
use std::collections::BTreeMap;

/// A vesting-style lock: `amount` locked at `init_block`, releasing
/// `release_per_block` every block. A lock with release 0 never decays —
/// that is the "operational" lock shape used to claim block production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedStake {
    pub amount: i64,
    pub release_per_block: i64,
    pub init_block: i64,
}

impl LockedStake {
    /// Remaining locked amount at `height`:
    /// max(0, amount − (height − init_block) · release_per_block).
    pub fn locked_at(&self, height: i64) -> i64 {
        if self.release_per_block <= 0 {
            return self.amount;
        }
        let elapsed = (height - self.init_block).max(0);
        (self.amount - elapsed.saturating_mul(self.release_per_block)).max(0)
    }

    pub fn fully_released(&self, height: i64) -> bool {
        self.release_per_block > 0 && self.locked_at(height) == 0
    }
}

/// Audit entry for one staking operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingDetail {
    pub amount: i64,
    pub reward: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingAccount {
    pub staked_balance: i64,
    pub staking_rewards: i64,
    pub locks: Vec<LockedStake>,
    /// The delegate slot's reserved address.
    pub delegated_account: Address,
    /// The staker.
    pub address: Address,
    /// True for the slot's block producer. First claim wins; cleared when
    /// the staked balance returns to zero.
    pub operational_account: bool,
    /// Audit log: height → operations applied at that height.
    pub staking_details: BTreeMap<i64, Vec<StakingDetail>>,
}

impl StakingAccount {
    pub fn new(slot: u8, address: Address) -> Self {
        Self {
            staked_balance: 0,
            staking_rewards: 0,
            locks: Vec::new(),
            delegated_account: Address::delegate(slot),
            address,
            operational_account: false,
            staking_details: BTreeMap::new(),
        }
    }

    /// Total locked at `height`, after dropping fully released locks.
    pub fn locked_amount(&mut self, height: i64) -> i64 {
        self.locks.retain(|l| !l.fully_released(height));
        self.locks.iter().map(|l| l.locked_at(height)).sum()
    }

    /// Read-only variant for supply audits and tests.
    pub fn locked_amount_at(&self, height: i64) -> i64 {
        self.locks
            .iter()
            .map(|l| l.locked_at(height))
            .sum()
    }

    /// Stake `amount` (> 0, ≥ MIN_STAKING_USER). A positive
    /// `release_per_block` registers a decaying lock over the deposit;
    /// zero registers no lock at all — the operational-claim shape is
    /// decided by the store, which sees the whole slot.
    pub fn stake(
        &mut self,
        amount: i64,
        release_per_block: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmountSign {
                op: "stake",
                amount,
            });
        }
        if amount < MIN_STAKING_USER {
            return Err(LedgerError::BelowMinimumStake {
                amount,
                minimum: MIN_STAKING_USER,
            });
        }
        if release_per_block < 0 {
            return Err(LedgerError::InvalidAmountSign {
                op: "stake.release_per_block",
                amount: release_per_block,
            });
        }
        self.staked_balance += amount;
        if release_per_block > 0 {
            self.locks.push(LockedStake {
                amount,
                release_per_block,
                init_block: height,
            });
        }
        self.record(height, amount, 0, timestamp);
        Ok(())
    }

    /// Unstake: `amount` must be negative. The withdrawal may not dip into
    /// the locked portion.
    pub fn unstake(
        &mut self,
        amount: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        if amount >= 0 {
            return Err(LedgerError::InvalidAmountSign {
                op: "unstake",
                amount,
            });
        }
        let locked = self.locked_amount(height);
        let available = self.staked_balance - locked;
        if available + amount < 0 {
            return Err(LedgerError::InsufficientStakedBalance {
                available,
                needed: -amount,
            });
        }
        self.staked_balance += amount;
        if self.staked_balance == 0 {
            // Producer status does not outlive the stake backing it
            self.operational_account = false;
        }
        self.record(height, amount, 0, timestamp);
        Ok(())
    }

    /// Accrue rewards: `amount` must be ≥ 0.
    pub fn reward(&mut self, amount: i64, height: i64, timestamp: i64) -> Result<(), LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmountSign {
                op: "reward",
                amount,
            });
        }
        self.staking_rewards += amount;
        self.record(height, 0, amount, timestamp);
        Ok(())
    }

    /// Drain accrued rewards: `amount` must be negative and may not exceed
    /// what has accrued.
    pub fn withdraw_reward(
        &mut self,
        amount: i64,
        height: i64,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        if amount >= 0 {
            return Err(LedgerError::InvalidAmountSign {
                op: "withdraw_reward",
                amount,
            });
        }
        if self.staking_rewards + amount < 0 {
            return Err(LedgerError::InsufficientRewards {
                available: self.staking_rewards,
                needed: -amount,
            });
        }
        self.staking_rewards += amount;
        self.record(height, 0, amount, timestamp);
        Ok(())
    }

    fn record(&mut self, height: i64, amount: i64, reward: i64, timestamp: i64) {
        self.staking_details.entry(height).or_default().push(StakingDetail {
            amount,
            reward,
            timestamp,
        });
    }
}
