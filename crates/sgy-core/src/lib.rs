// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - CORE MODULE
//
// Chain primitives: addresses, hashes, transactions, blocks, the Merkle
// tree, and the consensus constants. All financial arithmetic uses i64
// base units; a transaction that would drive any balance negative is
// rejected before state is touched.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};

pub mod block;
pub mod merkle;
pub mod state;
pub mod transaction;

/// 1 SGY = 100_000_000 base units (10^8 precision).
pub const UNITS_PER_SGY: i64 = 100_000_000;

/// Hard supply ceiling: 230,000,000 SGY in base units.
/// Every block's `supply` field is checked against this before anything else.
pub const MAX_TOTAL_SUPPLY: i64 = 230_000_000 * UNITS_PER_SGY;

/// Per-block emission ratio: reward = round(REWARD_RATIO * (MAX_TOTAL_SUPPLY - supply)).
/// Geometric decay toward the ceiling — the closer the chain gets to
/// MAX_TOTAL_SUPPLY, the smaller the reward.
pub const REWARD_RATIO: f64 = 1e-6;

/// Scales the difficulty term in the Proof of Synergy inequality:
/// threshold = 128 - difficulty / 10 / DIFFICULTY_MULTIPLIER.
pub const DIFFICULTY_MULTIPLIER: f64 = 100.0;

/// Difficulty of the genesis block.
pub const INITIAL_DIFFICULTY: i32 = 30;

/// Difficulty bounds enforced by `adjust_difficulty`.
pub const MIN_DIFFICULTY: i32 = 1;
pub const MAX_DIFFICULTY: i32 = 0xff00;

/// Target seconds between blocks.
pub const BLOCK_INTERVAL_SECS: i64 = 10;

/// Minimum total stake a delegate slot needs before its operational
/// account may produce blocks.
pub const MIN_STAKING_FOR_NODE: i64 = 100_000 * UNITS_PER_SGY;

/// Minimum single staking deposit.
pub const MIN_STAKING_USER: i64 = 100 * UNITS_PER_SGY;

/// Cap on transactions included in one block.
pub const MAX_TRANSACTIONS_IN_BLOCK: usize = 1000;

/// Maximum header-range window served per "gh" request.
pub const NUMBER_OF_HASHES_IN_BUCKET: i64 = 100;

/// How far below a detected divergence the rollback rewinds.
pub const SHIFT_TO_PAST_IN_RESET: i64 = 5;

/// Blocks a multisign proposal may wait for quorum before being purged.
pub const MULTISIGN_MAX_AGE_BLOCKS: i64 = 100;

/// Seconds after the previous block inside which encryption-scheme
/// transition checks are relaxed (anti-flapping grace window).
pub const SCHEME_GRACE_SECS: i64 = 600;

/// Bounded capacity of each mempool pool.
pub const POOL_CAPACITY: usize = 10_000;

/// Cap on simultaneously tracked peers.
pub const MAX_PEERS: usize = 50;

/// Chain ID, embedded in every signed payload to stop cross-chain replay.
/// Mainnet = 1, Testnet = 2. Compile with `--features mainnet` for mainnet.
#[cfg(feature = "mainnet")]
pub const CHAIN_ID: i16 = 1;
#[cfg(not(feature = "mainnet"))]
pub const CHAIN_ID: i16 = 2;

/// Returns true if this binary was compiled for mainnet.
pub const fn is_mainnet_build() -> bool {
    CHAIN_ID == 1
}

// ─────────────────────────────────────────────────────────────────
// ADDRESSES AND HASHES
// ─────────────────────────────────────────────────────────────────

/// 20-byte account address. Delegate slots 1..=255 live at the reserved
/// addresses `[0u8; 19] ++ [slot]`; a transaction sent to one of those is a
/// staking operation, not a transfer.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Address)
    }

    pub fn from_public_key(public_key: &[u8]) -> Self {
        Address(sgy_crypto::public_key_to_address(public_key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The reserved address of delegate slot `n` (1..=255).
    pub fn delegate(slot: u8) -> Self {
        debug_assert!(slot != 0, "slot 0 is not a delegate");
        let mut bytes = [0u8; 20];
        bytes[19] = slot;
        Address(bytes)
    }

    /// Some(slot) if this is a reserved delegate address.
    pub fn delegate_slot(&self) -> Option<u8> {
        if self.0[..19].iter().all(|b| *b == 0) && self.0[19] != 0 {
            Some(self.0[19])
        } else {
            None
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

/// 32-byte SHA3-256 digest.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockHash(pub [u8; 32]);

/// Alias kept for readability: transaction hashes and block hashes share
/// the same digest type.
pub type TxHash = BlockHash;

impl BlockHash {
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(BlockHash)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 hex chars are enough to eyeball a hash in logs
        write!(f, "BlockHash({}..)", &hex::encode(self.0)[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegate_address_roundtrip() {
        for slot in [1u8, 7, 255] {
            let addr = Address::delegate(slot);
            assert_eq!(addr.delegate_slot(), Some(slot));
        }
    }

    #[test]
    fn test_zero_address_is_not_a_delegate() {
        assert_eq!(Address::ZERO.delegate_slot(), None);
    }

    #[test]
    fn test_ordinary_address_is_not_a_delegate() {
        let mut bytes = [0u8; 20];
        bytes[0] = 1;
        bytes[19] = 9;
        assert_eq!(Address(bytes).delegate_slot(), None);
    }

    #[test]
    fn test_address_from_public_key_matches_crypto_seam() {
        let kp = sgy_crypto::keypair_from_seed(&[3u8; 32]);
        let addr = Address::from_public_key(&kp.public_key);
        assert_eq!(addr.0, sgy_crypto::public_key_to_address(&kp.public_key));
    }

    #[test]
    fn test_supply_ceiling_fits_i64() {
        assert!(MAX_TOTAL_SUPPLY > 0);
        assert!(MAX_TOTAL_SUPPLY < i64::MAX / 2);
    }
}
