// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - MERKLE TREE
//
// Binary SHA3-256 tree over a block's transaction hashes. The root is
// embedded in the block header and recomputed by every validator; a block
// whose stored root disagrees with the rebuilt one is rejected outright.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{BlockHash, TxHash};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Merkle tree with all intermediate layers retained.
/// Layer 0 is the leaves; the last layer holds the single root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    layers: Vec<Vec<BlockHash>>,
}

impl MerkleTree {
    /// Root of the empty tree: SHA3-256 of the empty string.
    /// Defined so that an empty block still binds a well-known value.
    pub fn empty_root() -> BlockHash {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Sha3_256::digest([]));
        BlockHash(hash)
    }

    /// Build the tree bottom-up. An odd node at any layer is paired with
    /// itself, Bitcoin-style.
    pub fn build(leaves: &[TxHash]) -> Self {
        if leaves.is_empty() {
            return MerkleTree {
                layers: vec![vec![Self::empty_root()]],
            };
        }

        let mut layers: Vec<Vec<BlockHash>> = vec![leaves.to_vec()];
        while layers.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let prev = layers.last().expect("non-empty by construction");
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            for pair in prev.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                next.push(hash_pair(&left, &right));
            }
            layers.push(next);
        }
        MerkleTree { layers }
    }

    pub fn root(&self) -> BlockHash {
        self.layers
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_else(Self::empty_root)
    }

    pub fn leaf_count(&self) -> usize {
        if self.layers.len() == 1 && self.layers[0] == vec![Self::empty_root()] {
            return 0;
        }
        self.layers.first().map(|l| l.len()).unwrap_or(0)
    }

    /// True if `leaf` is one of the tree's leaves. Used by the sync
    /// backfill path ("bx") where inclusion under an already-verified root
    /// substitutes for per-transaction signature re-verification.
    pub fn contains(&self, leaf: &TxHash) -> bool {
        if self.leaf_count() == 0 {
            return false;
        }
        self.layers[0].contains(leaf)
    }

    /// Inclusion proof for the leaf at `index`: sibling hashes from leaf to
    /// root, paired with a left/right flag for each step.
    pub fn proof(&self, index: usize) -> Option<Vec<(BlockHash, bool)>> {
        if self.leaf_count() == 0 || index >= self.layers[0].len() {
            return None;
        }
        let mut path = Vec::new();
        let mut idx = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_idx = idx ^ 1;
            // Odd tail duplicates itself
            let sibling = *layer.get(sibling_idx).unwrap_or(&layer[idx]);
            let sibling_is_right = idx % 2 == 0;
            path.push((sibling, sibling_is_right));
            idx /= 2;
        }
        Some(path)
    }

    /// Verify an inclusion proof against a known root.
    pub fn verify_proof(root: &BlockHash, leaf: &TxHash, path: &[(BlockHash, bool)]) -> bool {
        let mut acc = *leaf;
        for (sibling, sibling_is_right) in path {
            acc = if *sibling_is_right {
                hash_pair(&acc, sibling)
            } else {
                hash_pair(sibling, &acc)
            };
        }
        acc == *root
    }
}

fn hash_pair(left: &BlockHash, right: &BlockHash) -> BlockHash {
    let mut hasher = Sha3_256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    BlockHash(out)
}
