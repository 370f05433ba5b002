// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - PROOF OF SYNERGY
//
// A difficulty-scaled leading-zero-bit test over a 128-bit value derived
// from the header hash. The header contains no free nonce: the signature
// is the only variable input, so a header that satisfies the inequality
// is a probabilistic by-product of signing.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use sgy_core::{BlockHash, DIFFICULTY_MULTIPLIER};

/// Derived 128-bit value: first 16 bytes of the header hash ANDed with the
/// last 16, big-endian. The AND biases the value toward zero, so the check
/// is noticeably easier than a raw 128-bit comparison at equal thresholds.
pub fn synergy_value(header_hash: &BlockHash) -> u128 {
    let bytes = header_hash.as_bytes();
    let mut head = [0u8; 16];
    let mut tail = [0u8; 16];
    head.copy_from_slice(&bytes[..16]);
    tail.copy_from_slice(&bytes[16..]);
    u128::from_be_bytes(head) & u128::from_be_bytes(tail)
}

/// log2(synergy_value) ≤ 128 − difficulty / 10 / DIFFICULTY_MULTIPLIER.
/// A zero value passes at any difficulty.
pub fn valid_proof(header_hash: &BlockHash, difficulty: i32) -> bool {
    let value = synergy_value(header_hash);
    if value == 0 {
        return true;
    }
    let threshold = 128.0 - (difficulty as f64) / 10.0 / DIFFICULTY_MULTIPLIER;
    (value as f64).log2() <= threshold
}
