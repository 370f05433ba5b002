use crate::scheme::SchemeViolation;
use sgy_core::{Address, TxHash};
use sgy_ledger::LedgerError;
use thiserror::Error;

/// Structural/consensus violations: always fatal to the block, which is
/// rejected whole. Never partially applied.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("supply {supply} exceeds the maximum total supply")]
    SupplyExceeded { supply: i64 },

    #[error("chain mismatch at height {height}: previous hash does not match the local tip")]
    ChainMismatch { height: i64 },

    #[error("height {got} does not follow {expected}")]
    HeightMismatch { expected: i64, got: i64 },

    #[error("proof of synergy failed at difficulty {difficulty}")]
    InvalidProof { difficulty: i32 },

    #[error("header hash mismatch: stored digest differs from recomputed")]
    HeaderHashMismatch,

    #[error("block hash mismatch: stored digest differs from recomputed")]
    BlockHashMismatch,

    #[error("merkle root mismatch: header root does not bind the transaction set")]
    MerkleMismatch,

    #[error("oracle verification rejected: {0}")]
    OracleRejected(String),

    #[error("encryption scheme transition: {0}")]
    SchemeTransition(#[from] SchemeViolation),
}

/// Block application failures. Ledger legality violations are fatal to the
/// embedding block check; conservation violations are fatal full stop.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("transaction {hash}: {source}")]
    Ledger {
        hash: TxHash,
        #[source]
        source: LedgerError,
    },

    #[error("transaction {hash} malformed: {reason}")]
    MalformedTransaction { hash: TxHash, reason: String },

    #[error("transaction {0} signature invalid")]
    BadSignature(TxHash),

    #[error("transaction {0} referenced by block but not available")]
    MissingTransaction(TxHash),

    #[error("reward mismatch: computed {expected}, block supply implies {got}")]
    RewardMismatch { expected: i64, got: i64 },

    #[error("block fee mismatch: transactions paid {computed}, block says {declared}")]
    FeeMismatch { computed: i64, declared: i64 },

    #[error("supply conservation violated: accounted {accounted}, block supply {supply}")]
    SupplyConservation { accounted: i64, supply: i64 },

    #[error("reward split produced a negative remainder of {0}")]
    RewardRemainderNegative(i64),

    #[error("block not addressed to a delegate slot")]
    NotADelegate,

    #[error("delegate slot {slot} has {staked} staked, below the operating minimum")]
    DelegateUnderStaked { slot: u8, staked: i64 },

    #[error("operator {got} is not the operational account of slot {slot}")]
    OperatorNotOperational { slot: u8, got: Address },

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("storage: {0}")]
    Storage(String),
}
