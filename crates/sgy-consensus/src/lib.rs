// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - CONSENSUS
//
// Block validation and application. The validator answers "is this block
// structurally legal against its predecessor"; the applicator answers
// "do its transactions compose against the ledger" and then commits
// them. Both are pure library code: networking and scheduling live in
// sgy-network and the node binary.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod applicator;
pub mod error;
pub mod proof;
pub mod scheme;
pub mod validator;

pub use applicator::{
    check_block_and_transfer_funds, check_block_transfers, compute_block_reward,
    process_block_transfers, resolve_transactions, split_reward, DeltaLedger,
};
pub use error::{ApplyError, ConsensusError};
pub use proof::{synergy_value, valid_proof};
pub use scheme::{SchemeDescriptor, SchemeViolation};
pub use validator::{
    AcceptAllOracles, BlockValidator, NoVotes, OracleVerifier, SchemeVoteRegistry,
};
