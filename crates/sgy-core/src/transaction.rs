// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - TRANSACTIONS
//
// Transfer, staking, multisign-approval, and nonce-proposal payloads all
// share one Transaction envelope. The payload is a closed enum — a new
// operation kind is a compile-time change, not a string convention.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{Address, BlockHash, TxHash, CHAIN_ID};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Per-round block-proposal ingredients carried by a nonce transaction
/// (unrelated to account nonces): the proposer's view of the chain tip plus
/// its oracle samples and pending encryption-transition vote data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonceData {
    /// Height this proposal targets (current height + 1).
    pub height: i64,
    /// Hash of the block the proposal builds on.
    pub previous_hash: BlockHash,
    /// Price oracle sample (base units per reference asset).
    pub price_oracle: i64,
    /// Random oracle sample.
    pub rand_oracle: i64,
    /// Opaque encryption-transition vote payload, forwarded to the vote
    /// registry collaborator.
    pub vote_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxData {
    /// Plain balance transfer to `recipient`.
    Transfer,
    /// Stake `amount` into the recipient delegate slot. A zero
    /// `release_per_block` locks nothing; a positive one creates a lock
    /// that decays linearly per block.
    Stake { release_per_block: i64 },
    /// Withdraw `amount` of staked balance from the recipient delegate slot.
    Unstake,
    /// Withdraw `amount` of accrued staking rewards from the slot.
    WithdrawReward,
    /// Approval vote for a pending multisign proposal.
    MultiSignApprove { main_hash: TxHash },
    /// Block-proposal gossip round message.
    NonceProposal(NonceData),
    /// Opaque user payload (contract calls and the like, executed by the
    /// external engine — the core only moves the funds).
    Payload(Vec<u8>),
}

impl TxData {
    fn type_byte(&self) -> u8 {
        match self {
            TxData::Transfer => 0,
            TxData::Stake { .. } => 1,
            TxData::Unstake => 2,
            TxData::WithdrawReward => 3,
            TxData::MultiSignApprove { .. } => 4,
            TxData::NonceProposal(_) => 5,
            TxData::Payload(_) => 6,
        }
    }

    /// True for the payload kinds only legal against a delegate address.
    pub fn is_staking_op(&self) -> bool {
        matches!(
            self,
            TxData::Stake { .. } | TxData::Unstake | TxData::WithdrawReward
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    /// Amount moved, always non-negative; the payload kind decides the
    /// direction (Unstake/WithdrawReward debit the staking side).
    pub amount: i64,
    pub fee: i64,
    /// Target height: the height the sender observed when creating the
    /// transaction. Escrow release is measured from it.
    pub height: i64,
    pub timestamp: i64,
    pub data: TxData,
    /// Sender public key (hex-free raw bytes); must derive to `sender`.
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    /// SHA3-256 over signing bytes + signature. Set by `seal()`.
    pub hash: TxHash,
}

impl Transaction {
    /// Canonical bytes covered by the signature: every field except
    /// `signature` and `hash`, in fixed order, chain-id first.
    /// The field order is consensus — changing it forks the chain.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&CHAIN_ID.to_le_bytes());
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(self.recipient.as_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.data.type_byte());
        match &self.data {
            TxData::Transfer | TxData::Unstake | TxData::WithdrawReward => {}
            TxData::Stake { release_per_block } => {
                out.extend_from_slice(&release_per_block.to_le_bytes());
            }
            TxData::MultiSignApprove { main_hash } => {
                out.extend_from_slice(main_hash.as_bytes());
            }
            TxData::NonceProposal(n) => {
                out.extend_from_slice(&n.height.to_le_bytes());
                out.extend_from_slice(n.previous_hash.as_bytes());
                out.extend_from_slice(&n.price_oracle.to_le_bytes());
                out.extend_from_slice(&n.rand_oracle.to_le_bytes());
                out.extend_from_slice(&n.vote_data);
            }
            TxData::Payload(bytes) => out.extend_from_slice(bytes),
        }
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha3_256::digest(self.signing_bytes()));
        out
    }

    /// Transaction identity: signing hash + signature, so two transactions
    /// that differ only in signature still get distinct hashes.
    pub fn compute_hash(&self) -> TxHash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.signing_hash());
        hasher.update(&self.signature);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash(out)
    }

    /// Sign with the sender's key and fix the hash.
    pub fn sign(&mut self, keypair: &sgy_crypto::KeyPair) -> Result<(), sgy_crypto::CryptoError> {
        self.public_key = keypair.public_key.clone();
        self.signature = sgy_crypto::sign_message(&self.signing_hash(), &keypair.secret_key)?;
        self.hash = self.compute_hash();
        Ok(())
    }

    /// Verify the signature AND the sender↔public-key binding. A valid
    /// signature under a key that does not derive to `sender` is theft,
    /// not a transaction.
    pub fn verify_signature(&self) -> bool {
        if self.signature.is_empty() || self.public_key.is_empty() {
            return false;
        }
        if Address::from_public_key(&self.public_key) != self.sender {
            return false;
        }
        sgy_crypto::verify_signature(&self.signing_hash(), &self.signature, &self.public_key)
    }

    /// Structural checks that need no ledger state.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.amount < 0 {
            return Err(format!("negative amount {}", self.amount));
        }
        if self.fee < 0 {
            return Err(format!("negative fee {}", self.fee));
        }
        let to_delegate = self.recipient.delegate_slot().is_some();
        if self.data.is_staking_op() && !to_delegate {
            return Err("staking operation addressed to a non-delegate account".to_string());
        }
        if to_delegate && !self.data.is_staking_op() {
            return Err("non-staking payload addressed to a delegate slot".to_string());
        }
        if self.hash != self.compute_hash() {
            return Err("stored hash does not match recomputed hash".to_string());
        }
        Ok(())
    }

    pub fn is_nonce_proposal(&self) -> bool {
        matches!(self.data, TxData::NonceProposal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn signed_tx(
        seed: u8,
        recipient: Address,
        amount: i64,
        data: TxData,
    ) -> Transaction {
        let kp = sgy_crypto::keypair_from_seed(&[seed; 32]);
        let mut tx = Transaction {
            sender: Address::from_public_key(&kp.public_key),
            recipient,
            amount,
            fee: 10,
            height: 5,
            timestamp: 1_700_000_000,
            data,
            public_key: vec![],
            signature: vec![],
            hash: BlockHash::ZERO,
        };
        tx.sign(&kp).unwrap();
        tx
    }

    #[test]
    fn test_sign_verify() {
        let tx = signed_tx(1, Address([9u8; 20]), 100, TxData::Transfer);
        assert!(tx.verify_signature());
        assert!(tx.check_shape().is_ok());
    }

    #[test]
    fn test_sender_binding_rejects_foreign_key() {
        let mut tx = signed_tx(1, Address([9u8; 20]), 100, TxData::Transfer);
        // Re-sign with a different key but keep the old sender
        let other = sgy_crypto::keypair_from_seed(&[2u8; 32]);
        tx.public_key = other.public_key.clone();
        tx.signature =
            sgy_crypto::sign_message(&tx.signing_hash(), &other.secret_key).unwrap();
        tx.hash = tx.compute_hash();
        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_every_field_binds_the_hash() {
        let base = signed_tx(1, Address([9u8; 20]), 100, TxData::Transfer);
        let mut t = base.clone();
        t.amount += 1;
        assert_ne!(t.signing_hash(), base.signing_hash());
        let mut t = base.clone();
        t.fee += 1;
        assert_ne!(t.signing_hash(), base.signing_hash());
        let mut t = base.clone();
        t.height += 1;
        assert_ne!(t.signing_hash(), base.signing_hash());
        let mut t = base.clone();
        t.recipient = Address([8u8; 20]);
        assert_ne!(t.signing_hash(), base.signing_hash());
        let mut t = base.clone();
        t.data = TxData::Payload(vec![1]);
        assert_ne!(t.signing_hash(), base.signing_hash());
    }

    #[test]
    fn test_staking_shape_requires_delegate_recipient() {
        let tx = signed_tx(1, Address([9u8; 20]), 100, TxData::Unstake);
        assert!(tx.check_shape().is_err());
        let tx = signed_tx(1, Address::delegate(3), 100, TxData::Unstake);
        assert!(tx.check_shape().is_ok());
    }

    #[test]
    fn test_transfer_to_delegate_is_rejected() {
        let tx = signed_tx(1, Address::delegate(3), 100, TxData::Transfer);
        assert!(tx.check_shape().is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut tx = signed_tx(1, Address([9u8; 20]), 100, TxData::Transfer);
        tx.amount = -5;
        tx.hash = tx.compute_hash();
        assert!(tx.check_shape().is_err());
    }

    #[test]
    fn test_hash_covers_signature() {
        let a = signed_tx(1, Address([9u8; 20]), 100, TxData::Transfer);
        let mut b = a.clone();
        b.signature = vec![0u8; 64];
        assert_ne!(a.hash, b.compute_hash());
    }
}
