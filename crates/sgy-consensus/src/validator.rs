// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - BLOCK VALIDATOR
//
// Structural validation of a candidate block against its predecessor:
// supply cap, chain linkage, Proof of Synergy, hash integrity, Merkle
// root, oracle samples, and encryption-scheme transitions. Any failure
// rejects the block whole; nothing here touches the ledger.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::ConsensusError;
use crate::proof::valid_proof;
use crate::scheme;
use sgy_core::block::Block;
use sgy_core::merkle::MerkleTree;
use sgy_core::{MAX_TOTAL_SUPPLY, SCHEME_GRACE_SECS};

/// Price/random oracle sample verification. Real implementations talk to
/// the oracle sidecar; sync and tests use `AcceptAllOracles`.
pub trait OracleVerifier: Send + Sync {
    fn verify_price(&self, sample: i64, proof: &[u8]) -> Result<(), String>;
    fn verify_rand(&self, sample: i64, proof: &[u8]) -> Result<(), String>;
}

/// Stake-weighted vote verdicts for encryption-scheme replacements.
pub trait SchemeVoteRegistry: Send + Sync {
    /// Whether the given replacement descriptor has a passing vote.
    fn replacement_approved(&self, descriptor: &[u8]) -> bool;
}

/// Accepts every oracle sample. Used while syncing (historical samples
/// were verified live when first produced) and in tests.
pub struct AcceptAllOracles;

impl OracleVerifier for AcceptAllOracles {
    fn verify_price(&self, _sample: i64, _proof: &[u8]) -> Result<(), String> {
        Ok(())
    }
    fn verify_rand(&self, _sample: i64, _proof: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

/// No vote has passed. The safe default: scheme replacements are rejected
/// until a real registry says otherwise.
pub struct NoVotes;

impl SchemeVoteRegistry for NoVotes {
    fn replacement_approved(&self, _descriptor: &[u8]) -> bool {
        false
    }
}

pub struct BlockValidator<'a> {
    pub oracles: &'a dyn OracleVerifier,
    pub votes: &'a dyn SchemeVoteRegistry,
    /// While bulk-syncing, oracle delegation is skipped: sync-time blocks
    /// already passed live oracle checks when first produced.
    pub syncing: bool,
}

impl BlockValidator<'_> {
    /// Validate `new` against the locally accepted `last` block. Returns
    /// the rebuilt Merkle tree so the caller can store it on acceptance.
    pub fn check_base_block(
        &self,
        new: &Block,
        last: &Block,
        force_strict: bool,
    ) -> Result<MerkleTree, ConsensusError> {
        if new.base.supply > MAX_TOTAL_SUPPLY {
            return Err(ConsensusError::SupplyExceeded {
                supply: new.base.supply,
            });
        }

        let height = new.height();
        if height > 0 {
            if height != last.height() + 1 {
                return Err(ConsensusError::HeightMismatch {
                    expected: last.height() + 1,
                    got: height,
                });
            }
            if new.base.header.previous_hash != last.block_hash {
                return Err(ConsensusError::ChainMismatch { height });
            }
        }

        let header_hash = new.base.header.compute_hash();
        if header_hash != new.base.block_header_hash {
            return Err(ConsensusError::HeaderHashMismatch);
        }
        if !valid_proof(&header_hash, new.base.header.difficulty) {
            return Err(ConsensusError::InvalidProof {
                difficulty: new.base.header.difficulty,
            });
        }
        if new.compute_hash() != new.block_hash {
            return Err(ConsensusError::BlockHashMismatch);
        }

        let tree = MerkleTree::build(&new.transaction_hashes);
        if height > 0 && tree.root() != new.base.header.root_merkle_tree {
            return Err(ConsensusError::MerkleMismatch);
        }

        if !self.syncing {
            self.oracles
                .verify_price(new.base.price_oracle, &new.base.oracle_proof_price)
                .map_err(ConsensusError::OracleRejected)?;
            self.oracles
                .verify_rand(new.base.rand_oracle, &new.base.oracle_proof_rand)
                .map_err(ConsensusError::OracleRejected)?;
        }

        self.check_scheme_transitions(new, last, force_strict)?;
        Ok(tree)
    }

    /// Both descriptor lanes, then the pair rule. Transitions inside the
    /// grace window after the previous block are waved through unless
    /// `force_strict` (anti-flapping: a burst of blocks must not be able
    /// to cycle a scheme through pause/replace within one window).
    fn check_scheme_transitions(
        &self,
        new: &Block,
        last: &Block,
        force_strict: bool,
    ) -> Result<(), ConsensusError> {
        let in_grace = new.base.timestamp - last.base.timestamp <= SCHEME_GRACE_SECS;
        let lanes = [
            (
                &last.base.header.encryption_config1,
                &new.base.header.encryption_config1,
            ),
            (
                &last.base.header.encryption_config2,
                &new.base.header.encryption_config2,
            ),
        ];
        for (previous, next) in lanes {
            if previous == next {
                continue;
            }
            if in_grace && !force_strict {
                log::debug!(
                    "scheme transition at height {} inside grace window, deferred",
                    new.height()
                );
                continue;
            }
            let approved = self.votes.replacement_approved(next);
            scheme::validate_transition(previous, next, approved)?;
        }
        scheme::check_pair(
            &new.base.header.encryption_config1,
            &new.base.header.encryption_config2,
        )?;
        Ok(())
    }
}
