use sgy_core::Address;
use thiserror::Error;

/// Ledger legality violations are fatal to the offending transaction, never
/// to the node; storage faults are surfaced separately so callers can tell
/// a rule violation from a broken disk.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: account {account} has {balance}, needs {needed}")]
    InsufficientFunds {
        account: Address,
        balance: i64,
        needed: i64,
    },

    #[error("invalid amount sign for {op}: {amount}")]
    InvalidAmountSign { op: &'static str, amount: i64 },

    #[error("staking amount {amount} below minimum {minimum}")]
    BelowMinimumStake { amount: i64, minimum: i64 },

    #[error("insufficient staked balance: {available} available net of locks, {needed} requested")]
    InsufficientStakedBalance { available: i64, needed: i64 },

    #[error("insufficient staking rewards: {available} accrued, {needed} requested")]
    InsufficientRewards { available: i64, needed: i64 },

    #[error("account {0} cannot be both escrow-delayed and multisign")]
    EscrowMultisignConflict(Address),

    #[error("delegate slot {0} is not valid (must be 1..=255)")]
    InvalidDelegateSlot(u8),

    #[error("no snapshot stored at or below height {0}")]
    SnapshotNotFound(i64),

    #[error("storage: {0}")]
    Storage(String),
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}
