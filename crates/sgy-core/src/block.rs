// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - BLOCKS
//
// Header/block structures, canonical hashing, and difficulty adjustment.
// Blocks are immutable once stored: they are validated exactly once and
// then indexed both by hash and by height.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::merkle::MerkleTree;
use crate::{
    Address, BlockHash, TxHash, CHAIN_ID, INITIAL_DIFFICULTY, MAX_DIFFICULTY, MIN_DIFFICULTY,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Difficulty moves by this much per adjustment.
const DIFFICULTY_STEP: i32 = 10;

/// Fast/slow band around the target interval. Blocks arriving faster than
/// target/1.33 push difficulty up; slower than target*1.33 pull it down.
const INTERVAL_BAND: f64 = 1.33;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseHeader {
    pub previous_hash: BlockHash,
    pub difficulty: i32,
    pub height: i64,
    /// Delegate slot address this block was produced for.
    pub delegated_account: Address,
    /// The slot's operational account — the block producer.
    pub operator_account: Address,
    pub root_merkle_tree: BlockHash,
    /// Opaque primary encryption-scheme descriptor.
    pub encryption_config1: Vec<u8>,
    /// Opaque secondary encryption-scheme descriptor.
    pub encryption_config2: Vec<u8>,
    pub signature: Vec<u8>,
    /// The exact bytes the operator signed, kept so peers can re-verify
    /// without re-deriving field order.
    pub signed_message_bytes: Vec<u8>,
}

impl BaseHeader {
    /// Canonical bytes the operator signs: every field except the
    /// signature and its echo. Field order is consensus.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160);
        out.extend_from_slice(&CHAIN_ID.to_le_bytes());
        out.extend_from_slice(self.previous_hash.as_bytes());
        out.extend_from_slice(&self.difficulty.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(self.delegated_account.as_bytes());
        out.extend_from_slice(self.operator_account.as_bytes());
        out.extend_from_slice(self.root_merkle_tree.as_bytes());
        out.extend_from_slice(&(self.encryption_config1.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.encryption_config1);
        out.extend_from_slice(&(self.encryption_config2.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.encryption_config2);
        out
    }

    /// Header hash: signing bytes + signature. The Proof of Synergy is
    /// evaluated over this digest, which is why producing a valid block is
    /// a by-product of signing rather than a nonce search — the signature
    /// is the only free variable left in the header.
    pub fn compute_hash(&self) -> BlockHash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.signing_bytes());
        hasher.update(&self.signature);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash(out)
    }

    /// Sign the header with the operator key, recording the signed bytes.
    pub fn sign(&mut self, keypair: &sgy_crypto::KeyPair) -> Result<(), sgy_crypto::CryptoError> {
        self.signed_message_bytes = self.signing_bytes();
        self.signature = sgy_crypto::sign_message(&self.signed_message_bytes, &keypair.secret_key)?;
        Ok(())
    }

    pub fn verify_signature(&self, operator_public_key: &[u8]) -> bool {
        if self.signed_message_bytes != self.signing_bytes() {
            return false;
        }
        sgy_crypto::verify_signature(
            &self.signed_message_bytes,
            &self.signature,
            operator_public_key,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseBlock {
    pub header: BaseHeader,
    /// Hash of `header`, cached at build time and re-checked on receipt.
    pub block_header_hash: BlockHash,
    pub timestamp: i64,
    /// Operator share of the block reward, in thousandths (200 = 20%).
    pub reward_percentage: i32,
    /// Total supply after this block's reward is emitted.
    pub supply: i64,
    pub price_oracle: i64,
    pub rand_oracle: i64,
    pub oracle_proof_price: Vec<u8>,
    pub oracle_proof_rand: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub base: BaseBlock,
    pub transaction_hashes: Vec<TxHash>,
    /// Hash of the whole block, cached at build time and re-checked.
    pub block_hash: BlockHash,
    /// Sum of fees paid by this block's transactions. Credited to the NEXT
    /// block's operator, which is why it appears in the next block's
    /// supply-conservation equation.
    pub block_fee: i64,
}

impl Block {
    /// Block hash over the header hash plus all block-level fields and the
    /// transaction set.
    pub fn compute_hash(&self) -> BlockHash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.base.header.compute_hash().as_bytes());
        hasher.update(self.base.timestamp.to_le_bytes());
        hasher.update(self.base.reward_percentage.to_le_bytes());
        hasher.update(self.base.supply.to_le_bytes());
        hasher.update(self.base.price_oracle.to_le_bytes());
        hasher.update(self.base.rand_oracle.to_le_bytes());
        hasher.update(&self.base.oracle_proof_price);
        hasher.update(&self.base.oracle_proof_rand);
        for tx_hash in &self.transaction_hashes {
            hasher.update(tx_hash.as_bytes());
        }
        hasher.update(self.block_fee.to_le_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash(out)
    }

    /// Recompute and store both cached hashes.
    pub fn seal(&mut self) {
        self.base.block_header_hash = self.base.header.compute_hash();
        self.block_hash = self.compute_hash();
    }

    pub fn height(&self) -> i64 {
        self.base.header.height
    }

    /// The genesis block: height 0, no transactions. `supply` is the
    /// premined allocation total and must equal the sum of balances and
    /// stakes seeded into the ledger at bootstrap; nothing is emitted at
    /// genesis itself, so the supply-conservation induction base holds.
    pub fn genesis(
        delegated_account: Address,
        operator_account: Address,
        timestamp: i64,
        supply: i64,
    ) -> Block {
        let header = BaseHeader {
            previous_hash: BlockHash::ZERO,
            difficulty: INITIAL_DIFFICULTY,
            height: 0,
            delegated_account,
            operator_account,
            root_merkle_tree: MerkleTree::empty_root(),
            encryption_config1: Vec::new(),
            encryption_config2: Vec::new(),
            signature: Vec::new(),
            signed_message_bytes: Vec::new(),
        };
        let mut block = Block {
            base: BaseBlock {
                block_header_hash: BlockHash::ZERO,
                header,
                timestamp,
                reward_percentage: 0,
                supply,
                price_oracle: 0,
                rand_oracle: 0,
                oracle_proof_price: Vec::new(),
                oracle_proof_rand: Vec::new(),
            },
            transaction_hashes: Vec::new(),
            block_hash: BlockHash::ZERO,
            block_fee: 0,
        };
        block.seal();
        block
    }
}

/// Retune difficulty from the observed inter-block interval.
/// Never leaves `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
pub fn adjust_difficulty(previous: i32, actual_interval: i64, target_interval: i64) -> i32 {
    let actual = actual_interval.max(0) as f64;
    let target = target_interval as f64;
    let next = if actual * INTERVAL_BAND < target {
        previous + DIFFICULTY_STEP
    } else if actual > target * INTERVAL_BAND {
        previous - DIFFICULTY_STEP
    } else {
        previous
    };
    next.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}
