// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - SIGNATURE SEAM
//
// Narrow signing interface for the rest of the workspace. The consensus and
// ledger code never name the algorithm; everything goes through sign/verify
// and the pubkey→address derivation below. Today the concrete scheme is
// Ed25519 (RFC 8032). Swapping in a different scheme is a change to this
// crate only.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

/// Raw byte length of a public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Raw byte length of a secret key seed.
pub const SECRET_KEY_LEN: usize = 32;
/// Raw byte length of a signature.
pub const SIGNATURE_LEN: usize = 64;
/// Raw byte length of a derived address.
pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid secret key: expected {SECRET_KEY_LEN} bytes, got {0}")]
    InvalidSecretKey(usize),
    #[error("invalid public key: expected {PUBLIC_KEY_LEN} bytes, got {0}")]
    InvalidPublicKey(usize),
    #[error("invalid signature: expected {SIGNATURE_LEN} bytes, got {0}")]
    InvalidSignature(usize),
}

/// Keypair held as raw bytes so callers stay algorithm-agnostic.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl std::fmt::Debug for KeyPair {
    // Secret key never appears in logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh keypair from the OS entropy source.
pub fn generate_keypair() -> KeyPair {
    let mut seed = [0u8; SECRET_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    keypair_from_seed(&seed)
}

/// Deterministic keypair from a 32-byte seed (tests, operator key files).
pub fn keypair_from_seed(seed: &[u8; SECRET_KEY_LEN]) -> KeyPair {
    let signing = SigningKey::from_bytes(seed);
    KeyPair {
        public_key: signing.verifying_key().to_bytes().to_vec(),
        secret_key: seed.to_vec(),
    }
}

/// Rebuild a keypair from stored secret-key bytes.
pub fn keypair_from_secret(secret_bytes: &[u8]) -> Result<KeyPair, CryptoError> {
    let seed: [u8; SECRET_KEY_LEN] = secret_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSecretKey(secret_bytes.len()))?;
    Ok(keypair_from_seed(&seed))
}

/// Sign a message. Returns raw signature bytes.
pub fn sign_message(message: &[u8], secret_key_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let seed: [u8; SECRET_KEY_LEN] = secret_key_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSecretKey(secret_key_bytes.len()))?;
    let signing = SigningKey::from_bytes(&seed);
    Ok(signing.sign(message).to_bytes().to_vec())
}

/// Verify a signature. Malformed keys or signatures verify as false rather
/// than erroring — callers on the consensus path only care about validity.
pub fn verify_signature(message: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8]) -> bool {
    let pk_arr: [u8; PUBLIC_KEY_LEN] = match public_key_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    let verifying = match VerifyingKey::from_bytes(&pk_arr) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig_arr: [u8; SIGNATURE_LEN] = match signature_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    verifying.verify(message, &Signature::from_bytes(&sig_arr)).is_ok()
}

/// Derive the 20-byte account address from a public key:
/// last 20 bytes of SHA3-256(public_key).
///
/// The truncation mirrors common practice for hash-derived addresses and
/// keeps addresses scheme-independent — a future signature scheme with a
/// different key size still derives the same address shape.
pub fn public_key_to_address(public_key_bytes: &[u8]) -> [u8; ADDRESS_LEN] {
    let digest = Sha3_256::digest(public_key_bytes);
    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
    addr
}
