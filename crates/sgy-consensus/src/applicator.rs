// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - BLOCK APPLICATOR
//
// Two-phase block application: every transaction is first replayed
// against an uncommitted delta over the ledger (so transactions within
// one block compose), then applied for real together with the reward
// distribution. Supply conservation is checked on the committed sums
// before anything is written; a failing block leaves the ledger
// untouched.
//
// Fee timeline: block N's fees accumulate into `block_fee` and are
// credited to block N+1's operator. The conservation equation for block N
// therefore reads
//     accounts + staked + rewards + reward(N) + block_fee(N-1) == supply(N)
// and after application
//     accounts + staked + rewards == supply(N) - block_fee(N).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::ApplyError;
use sgy_core::block::Block;
use sgy_core::merkle::MerkleTree;
use sgy_core::transaction::{Transaction, TxData};
use sgy_core::{
    Address, TxHash, MAX_TOTAL_SUPPLY, MIN_STAKING_FOR_NODE, MIN_STAKING_USER, REWARD_RATIO,
};
use sgy_ledger::{LedgerError, LedgerStore, StakingAccount};
use sgy_mempool::MempoolSet;
use std::collections::HashMap;

/// reward = round(REWARD_RATIO × (MAX_TOTAL_SUPPLY − last_supply)).
/// Shrinks as the supply approaches the cap; never negative while the
/// supply stays under it.
pub fn compute_block_reward(last_supply: i64) -> i64 {
    (REWARD_RATIO * (MAX_TOTAL_SUPPLY - last_supply) as f64).round() as i64
}

/// Resolve a block's transaction hashes into transactions, in block
/// order. A hash the lookup cannot serve is reported so the sync path can
/// issue a backfill request instead of rejecting the block.
pub fn resolve_transactions<F>(block: &Block, lookup: F) -> Result<Vec<Transaction>, ApplyError>
where
    F: Fn(&TxHash) -> Option<Transaction>,
{
    block
        .transaction_hashes
        .iter()
        .map(|hash| lookup(hash).ok_or(ApplyError::MissingTransaction(*hash)))
        .collect()
}

/// Provisional view over the ledger: balances and staking figures read
/// through to committed state on first touch, then accumulate this
/// block's effects. Nothing is written back; the delta exists only to
/// answer "would this block's transactions compose legally".
pub struct DeltaLedger<'a> {
    ledger: &'a LedgerStore,
    balances: HashMap<Address, i64>,
    staked: HashMap<(u8, Address), i64>,
    rewards: HashMap<(u8, Address), i64>,
    /// Locks created by this block's own stakes. Not withdrawable within
    /// the same block.
    new_locked: HashMap<(u8, Address), i64>,
}

impl<'a> DeltaLedger<'a> {
    pub fn new(ledger: &'a LedgerStore) -> Self {
        Self {
            ledger,
            balances: HashMap::new(),
            staked: HashMap::new(),
            rewards: HashMap::new(),
            new_locked: HashMap::new(),
        }
    }

    fn balance(&mut self, addr: &Address) -> i64 {
        *self
            .balances
            .entry(*addr)
            .or_insert_with(|| self.ledger.get_balance(addr))
    }

    fn staked_balance(&mut self, slot: u8, addr: &Address) -> i64 {
        *self.staked.entry((slot, *addr)).or_insert_with(|| {
            self.ledger
                .get_staking_account(slot, addr)
                .map(|s| s.staked_balance)
                .unwrap_or(0)
        })
    }

    fn accrued_rewards(&mut self, slot: u8, addr: &Address) -> i64 {
        *self.rewards.entry((slot, *addr)).or_insert_with(|| {
            self.ledger
                .get_staking_account(slot, addr)
                .map(|s| s.staking_rewards)
                .unwrap_or(0)
        })
    }

    fn adjust_balance(&mut self, addr: Address, delta: i64) -> Result<(), LedgerError> {
        let current = self.balance(&addr);
        let next = current + delta;
        if next < 0 {
            return Err(LedgerError::InsufficientFunds {
                account: addr,
                balance: current,
                needed: -delta,
            });
        }
        self.balances.insert(addr, next);
        Ok(())
    }

    /// Replay one transaction's effect. Mirrors the ledger's own legality
    /// rules, but against the provisional figures.
    pub fn apply(&mut self, tx: &Transaction, block_height: i64) -> Result<(), LedgerError> {
        match &tx.data {
            TxData::Transfer | TxData::Payload(_) => {
                self.adjust_balance(tx.sender, -(tx.amount + tx.fee))?;
                self.adjust_balance(tx.recipient, tx.amount)?;
            }
            TxData::Stake { release_per_block } => {
                let slot = self.staking_slot(tx)?;
                if tx.amount <= 0 {
                    return Err(LedgerError::InvalidAmountSign {
                        op: "stake",
                        amount: tx.amount,
                    });
                }
                if tx.amount < MIN_STAKING_USER {
                    return Err(LedgerError::BelowMinimumStake {
                        amount: tx.amount,
                        minimum: MIN_STAKING_USER,
                    });
                }
                if *release_per_block < 0 {
                    return Err(LedgerError::InvalidAmountSign {
                        op: "stake.release_per_block",
                        amount: *release_per_block,
                    });
                }
                self.adjust_balance(tx.sender, -(tx.amount + tx.fee))?;
                let staked = self.staked_balance(slot, &tx.sender);
                self.staked.insert((slot, tx.sender), staked + tx.amount);
                if *release_per_block > 0 {
                    *self.new_locked.entry((slot, tx.sender)).or_insert(0) += tx.amount;
                }
            }
            TxData::Unstake => {
                let slot = self.staking_slot(tx)?;
                let staked = self.staked_balance(slot, &tx.sender);
                let locked = self
                    .ledger
                    .get_staking_account(slot, &tx.sender)
                    .map(|s| s.locked_amount_at(block_height))
                    .unwrap_or(0)
                    + self.new_locked.get(&(slot, tx.sender)).copied().unwrap_or(0);
                let available = staked - locked;
                if available < tx.amount {
                    return Err(LedgerError::InsufficientStakedBalance {
                        available,
                        needed: tx.amount,
                    });
                }
                self.staked.insert((slot, tx.sender), staked - tx.amount);
                self.adjust_balance(tx.sender, tx.amount - tx.fee)?;
            }
            TxData::WithdrawReward => {
                let slot = self.staking_slot(tx)?;
                let accrued = self.accrued_rewards(slot, &tx.sender);
                if accrued < tx.amount {
                    return Err(LedgerError::InsufficientRewards {
                        available: accrued,
                        needed: tx.amount,
                    });
                }
                self.rewards.insert((slot, tx.sender), accrued - tx.amount);
                self.adjust_balance(tx.sender, tx.amount - tx.fee)?;
            }
            TxData::MultiSignApprove { .. } => {
                self.adjust_balance(tx.sender, -tx.fee)?;
            }
            // Carries no funds; the check pass enforces zero amount/fee
            TxData::NonceProposal(_) => {}
        }
        Ok(())
    }

    fn staking_slot(&self, tx: &Transaction) -> Result<u8, LedgerError> {
        tx.recipient
            .delegate_slot()
            .ok_or(LedgerError::InvalidDelegateSlot(0))
    }
}

/// Phase one: replay the whole block against a delta. Returns
/// `(reward, total_fee)` without touching committed state. `strict`
/// additionally re-verifies every transaction signature; the gossiped
/// full-block path skips that, relying on the Merkle root binding
/// transactions that were verified on first receipt.
pub fn check_block_transfers(
    ledger: &LedgerStore,
    block: &Block,
    txs: &[Transaction],
    last: &Block,
    strict: bool,
) -> Result<(i64, i64), ApplyError> {
    let mut delta = DeltaLedger::new(ledger);
    let mut total_fee = 0i64;
    for tx in txs {
        tx.check_shape()
            .map_err(|reason| ApplyError::MalformedTransaction {
                hash: tx.hash,
                reason,
            })?;
        if strict && !tx.verify_signature() {
            return Err(ApplyError::BadSignature(tx.hash));
        }
        if tx.is_nonce_proposal() && (tx.amount != 0 || tx.fee != 0) {
            return Err(ApplyError::MalformedTransaction {
                hash: tx.hash,
                reason: "nonce proposal must carry no funds".to_string(),
            });
        }
        delta
            .apply(tx, block.height())
            .map_err(|source| ApplyError::Ledger {
                hash: tx.hash,
                source,
            })?;
        total_fee += tx.fee;
    }

    let reward = compute_block_reward(last.base.supply);
    if last.base.supply + reward != block.base.supply {
        return Err(ApplyError::RewardMismatch {
            expected: reward,
            got: block.base.supply - last.base.supply,
        });
    }
    Ok((reward, total_fee))
}

/// Split `reward` into per-address payouts: `reward_percentage` in
/// thousandths to the operator, the rest pro-rata by stake with integer
/// floor division, and the rounding remainder swept back to the operator
/// so the payouts sum to `reward` exactly. A negative remainder means the
/// arithmetic overpaid and is a fatal invariant violation.
pub fn split_reward(
    reward: i64,
    reward_percentage: i32,
    operator: Address,
    stakers: &[StakingAccount],
) -> Result<Vec<(Address, i64)>, ApplyError> {
    let operator_cut = ((reward as i128 * reward_percentage as i128) / 1000) as i64;
    let staker_pool = reward - operator_cut;
    let total_stake: i64 = stakers.iter().map(|s| s.staked_balance).sum();

    let mut payouts = Vec::with_capacity(stakers.len() + 1);
    let mut distributed = 0i64;
    if total_stake > 0 && staker_pool > 0 {
        for staker in stakers {
            let share = ((staker_pool as i128 * staker.staked_balance as i128)
                / total_stake as i128) as i64;
            if share > 0 {
                payouts.push((staker.address, share));
                distributed += share;
            }
        }
    }

    let remainder = staker_pool - distributed;
    if remainder < 0 {
        return Err(ApplyError::RewardRemainderNegative(remainder));
    }
    payouts.push((operator, operator_cut + remainder));
    Ok(payouts)
}

/// Phase two: apply every transaction for real, then distribute
/// `reward` plus the previous block's carried fee into the delegate
/// slot's staking accounts. Only called after `check_block_transfers`
/// passed, so individual failures here indicate a bug, not bad input;
/// they still propagate rather than panic.
pub fn process_block_transfers(
    ledger: &LedgerStore,
    block: &Block,
    txs: &[Transaction],
    reward: i64,
    carried_fee: i64,
) -> Result<(), ApplyError> {
    let height = block.height();
    let timestamp = block.base.timestamp;

    for tx in txs {
        apply_for_real(ledger, tx, height, timestamp).map_err(|source| ApplyError::Ledger {
            hash: tx.hash,
            source,
        })?;
        if !tx.is_nonce_proposal() {
            ledger.record_transaction(tx.sender, tx.recipient, tx.hash);
        }
    }

    let slot = block
        .base
        .header
        .delegated_account
        .delegate_slot()
        .ok_or(ApplyError::NotADelegate)?;
    let (stakers, _, _) = ledger
        .get_staked_in_delegated_account(slot)
        .map_err(|e| ApplyError::Storage(e.to_string()))?;
    let operator = block.base.header.operator_account;

    let mut payouts = split_reward(reward, block.base.reward_percentage, operator, &stakers)?;
    if carried_fee > 0 {
        payouts.push((operator, carried_fee));
    }
    for (addr, amount) in payouts {
        ledger
            .reward(slot, addr, amount, height, timestamp)
            .map_err(|e| ApplyError::Storage(e.to_string()))?;
    }
    Ok(())
}

fn apply_for_real(
    ledger: &LedgerStore,
    tx: &Transaction,
    height: i64,
    timestamp: i64,
) -> Result<(), LedgerError> {
    match &tx.data {
        TxData::Transfer | TxData::Payload(_) => {
            ledger.add_balance(tx.sender, -(tx.amount + tx.fee))?;
            ledger.add_balance(tx.recipient, tx.amount)?;
        }
        TxData::Stake { release_per_block } => {
            let slot = tx
                .recipient
                .delegate_slot()
                .ok_or(LedgerError::InvalidDelegateSlot(0))?;
            ledger.add_balance(tx.sender, -(tx.amount + tx.fee))?;
            ledger.stake(slot, tx.sender, tx.amount, *release_per_block, height, timestamp)?;
        }
        TxData::Unstake => {
            let slot = tx
                .recipient
                .delegate_slot()
                .ok_or(LedgerError::InvalidDelegateSlot(0))?;
            ledger.unstake(slot, tx.sender, -tx.amount, height, timestamp)?;
            ledger.add_balance(tx.sender, tx.amount - tx.fee)?;
        }
        TxData::WithdrawReward => {
            let slot = tx
                .recipient
                .delegate_slot()
                .ok_or(LedgerError::InvalidDelegateSlot(0))?;
            ledger.withdraw_reward(slot, tx.sender, -tx.amount, height, timestamp)?;
            ledger.add_balance(tx.sender, tx.amount - tx.fee)?;
        }
        TxData::MultiSignApprove { .. } => {
            ledger.add_balance(tx.sender, -tx.fee)?;
        }
        TxData::NonceProposal(_) => {}
    }
    Ok(())
}

/// Full block acceptance: delegate-slot gates, two-phase application,
/// the central supply-conservation check, and persistence. The caller
/// holds the block-level lock; blocks are never applied concurrently.
pub fn check_block_and_transfer_funds(
    ledger: &LedgerStore,
    mempool: Option<&MempoolSet>,
    block: &Block,
    txs: &[Transaction],
    last: &Block,
    strict: bool,
) -> Result<(), ApplyError> {
    let slot = block
        .base
        .header
        .delegated_account
        .delegate_slot()
        .ok_or(ApplyError::NotADelegate)?;
    let (_, total_staked, operational) = ledger
        .get_staked_in_delegated_account(slot)
        .map_err(|e| ApplyError::Storage(e.to_string()))?;
    if total_staked < MIN_STAKING_FOR_NODE {
        return Err(ApplyError::DelegateUnderStaked {
            slot,
            staked: total_staked,
        });
    }
    if operational != Some(block.base.header.operator_account) {
        return Err(ApplyError::OperatorNotOperational {
            slot,
            got: block.base.header.operator_account,
        });
    }

    let (reward, total_fee) = check_block_transfers(ledger, block, txs, last, strict)?;
    if total_fee != block.block_fee {
        return Err(ApplyError::FeeMismatch {
            computed: total_fee,
            declared: block.block_fee,
        });
    }

    // The conservation invariant, evaluated on committed sums before
    // anything is applied.
    let accounted = ledger.get_supply_in_accounts()
        + ledger.get_supply_staked()
        + ledger.get_supply_rewards()
        + reward
        + last.block_fee;
    if accounted != block.base.supply {
        return Err(ApplyError::SupplyConservation {
            accounted,
            supply: block.base.supply,
        });
    }

    // Escrow transactions whose delay elapsed at this height become
    // eligible for the next block.
    if let Some(pools) = mempool {
        for tx in pools.release_due_escrow(block.height(), |a| ledger.get_account(a)) {
            pools.enqueue_standard(tx);
        }
    }

    process_block_transfers(ledger, block, txs, reward, last.block_fee)?;

    if let Some(pools) = mempool {
        for hash in &block.transaction_hashes {
            pools.remove_by_hash(hash);
        }
    }

    if let Some(db) = ledger.db() {
        let storage = |e: LedgerError| ApplyError::Storage(e.to_string());
        let tree = MerkleTree::build(&block.transaction_hashes);
        db.save_merkle_tree(block.height(), &tree).map_err(storage)?;
        db.put_block(block).map_err(storage)?;
        db.confirm_transactions(&block.transaction_hashes).map_err(storage)?;
        ledger.commit(block.height()).map_err(storage)?;
    }

    // Best-effort: scheme transitions already validated by the block
    // validator; recording them must not fail the block.
    if block.base.header.encryption_config1 != last.base.header.encryption_config1
        || block.base.header.encryption_config2 != last.base.header.encryption_config2
    {
        log::info!(
            "encryption scheme transition took effect at height {}",
            block.height()
        );
    }

    log::debug!(
        "applied block {} at height {}: {} txs, reward {}, fee {}",
        block.block_hash,
        block.height(),
        txs.len(),
        reward,
        total_fee
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sgy_core::BlockHash;

    fn keypair(seed: u8) -> sgy_crypto::KeyPair {
        sgy_crypto::keypair_from_seed(&[seed; 32])
    }

    fn addr_of(kp: &sgy_crypto::KeyPair) -> Address {
        Address::from_public_key(&kp.public_key)
    }

    fn staker(addr: Address, staked: i64) -> StakingAccount {
        let mut s = StakingAccount::new(1, addr);
        s.staked_balance = staked;
        s
    }

    fn signed_transfer(kp: &sgy_crypto::KeyPair, recipient: Address, amount: i64, fee: i64) -> Transaction {
        let mut tx = Transaction {
            sender: addr_of(kp),
            recipient,
            amount,
            fee,
            height: 0,
            timestamp: 1_700_000_000,
            data: TxData::Transfer,
            public_key: vec![],
            signature: vec![],
            hash: BlockHash::ZERO,
        };
        tx.sign(kp).unwrap();
        tx
    }

    fn signed_staking(
        kp: &sgy_crypto::KeyPair,
        slot: u8,
        amount: i64,
        fee: i64,
        data: TxData,
    ) -> Transaction {
        let mut tx = Transaction {
            sender: addr_of(kp),
            recipient: Address::delegate(slot),
            amount,
            fee,
            height: 0,
            timestamp: 1_700_000_000,
            data,
            public_key: vec![],
            signature: vec![],
            hash: BlockHash::ZERO,
        };
        tx.sign(kp).unwrap();
        tx
    }

    /// Ledger with the operator staked operational in slot 1 and a funded
    /// user; genesis supply covers exactly what was seeded.
    fn setup(user_funds: i64) -> (LedgerStore, sgy_crypto::KeyPair, sgy_crypto::KeyPair, Block) {
        let ledger = LedgerStore::in_memory();
        let operator = keypair(1);
        let user = keypair(2);
        ledger
            .stake(1, addr_of(&operator), MIN_STAKING_FOR_NODE, 0, 0, 0)
            .unwrap();
        ledger.set_balance(addr_of(&user), user_funds);
        let premine = MIN_STAKING_FOR_NODE + user_funds;
        let genesis = Block::genesis(Address::delegate(1), addr_of(&operator), 1_700_000_000, premine);
        (ledger, operator, user, genesis)
    }

    /// Well-formed child block; the applicator does not check the proof
    /// or header signature, so none is produced.
    fn build_block(last: &Block, operator: &sgy_crypto::KeyPair, txs: &[Transaction], pct: i32) -> Block {
        let hashes: Vec<TxHash> = txs.iter().map(|t| t.hash).collect();
        let mut block = last.clone();
        block.base.header.previous_hash = last.block_hash;
        block.base.header.height = last.height() + 1;
        block.base.header.delegated_account = Address::delegate(1);
        block.base.header.operator_account = addr_of(operator);
        block.base.header.root_merkle_tree = MerkleTree::build(&hashes).root();
        block.base.timestamp = last.base.timestamp + 10;
        block.base.reward_percentage = pct;
        block.base.supply = last.base.supply + compute_block_reward(last.base.supply);
        block.transaction_hashes = hashes;
        block.block_fee = txs.iter().map(|t| t.fee).sum();
        block.base.header.sign(operator).unwrap();
        block.seal();
        block
    }

    #[test]
    fn test_reward_split_operator_and_prorata() {
        // reward 1000, 20% operator cut, stakes 300/700
        let a = Address([1; 20]);
        let b = Address([2; 20]);
        let op = Address([9; 20]);
        let payouts =
            split_reward(1000, 200, op, &[staker(a, 300), staker(b, 700)]).unwrap();
        assert_eq!(payouts, vec![(a, 240), (b, 560), (op, 200)]);
    }

    #[test]
    fn test_reward_split_remainder_swept_to_operator() {
        // pool 667 over three equal stakes: 222 each, remainder 1
        let op = Address([9; 20]);
        let stakers: Vec<StakingAccount> =
            (1..=3).map(|n| staker(Address([n; 20]), 100)).collect();
        let payouts = split_reward(1000, 333, op, &stakers).unwrap();
        let total: i64 = payouts.iter().map(|(_, v)| v).sum();
        assert_eq!(total, 1000);
        assert_eq!(payouts.last(), Some(&(op, 333 + 1)));
    }

    #[test]
    fn test_reward_split_no_stakers_goes_to_operator() {
        let op = Address([9; 20]);
        let payouts = split_reward(1000, 200, op, &[]).unwrap();
        assert_eq!(payouts, vec![(op, 1000)]);
    }

    proptest! {
        /// Payouts always sum to the reward exactly, for any stake shape.
        #[test]
        fn prop_reward_split_conserves(
            reward in 0i64..1_000_000_000,
            pct in 0i32..=1000,
            stakes in proptest::collection::vec(0i64..1_000_000_000_000, 0..20),
        ) {
            let op = Address([9; 20]);
            let stakers: Vec<StakingAccount> = stakes
                .iter()
                .enumerate()
                .map(|(i, s)| staker(Address([i as u8 + 1; 20]), *s))
                .collect();
            let payouts = split_reward(reward, pct, op, &stakers).unwrap();
            let total: i64 = payouts.iter().map(|(_, v)| v).sum();
            prop_assert_eq!(total, reward);
            prop_assert!(payouts.iter().all(|(_, v)| *v >= 0));
        }
    }

    #[test]
    fn test_delta_composes_within_one_block() {
        // User can spend funds received earlier in the same block
        let (ledger, operator, user, genesis) = setup(10_000);
        let receiver = keypair(3);
        ledger.set_balance(addr_of(&receiver), 0);

        let t1 = signed_transfer(&user, addr_of(&receiver), 5_000, 10);
        let t2 = signed_transfer(&receiver, Address([0x55; 20]), 4_000, 10);
        let block = build_block(&genesis, &operator, &[t1.clone(), t2.clone()], 200);
        let (_, fee) =
            check_block_transfers(&ledger, &block, &[t1.clone(), t2.clone()], &genesis, true)
                .unwrap();
        assert_eq!(fee, 20);

        // Reversed order fails: funds not yet received
        let block = build_block(&genesis, &operator, &[t2.clone(), t1.clone()], 200);
        let err = check_block_transfers(&ledger, &block, &[t2, t1], &genesis, true).unwrap_err();
        assert!(matches!(err, ApplyError::Ledger { source: LedgerError::InsufficientFunds { .. }, .. }));
    }

    #[test]
    fn test_fee_unaffordable_rejected() {
        let (ledger, operator, user, genesis) = setup(100);
        let tx = signed_transfer(&user, Address([0x55; 20]), 95, 10);
        let block = build_block(&genesis, &operator, &[tx.clone()], 200);
        let err = check_block_transfers(&ledger, &block, &[tx], &genesis, true).unwrap_err();
        assert!(matches!(err, ApplyError::Ledger { source: LedgerError::InsufficientFunds { .. }, .. }));
    }

    #[test]
    fn test_unstake_cannot_dip_into_block_local_lock() {
        let (ledger, operator, user, genesis) = setup(10 * MIN_STAKING_USER);
        // Stake with a vesting lock, then try to unstake in the same block
        let stake = signed_staking(
            &user,
            1,
            MIN_STAKING_USER,
            10,
            TxData::Stake { release_per_block: 1 },
        );
        let unstake = signed_staking(&user, 1, MIN_STAKING_USER, 10, TxData::Unstake);
        let block = build_block(&genesis, &operator, &[stake.clone(), unstake.clone()], 200);
        let err =
            check_block_transfers(&ledger, &block, &[stake, unstake], &genesis, true).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Ledger { source: LedgerError::InsufficientStakedBalance { .. }, .. }
        ));
    }

    #[test]
    fn test_reward_mismatch_rejected() {
        let (ledger, operator, _, genesis) = setup(0);
        let mut block = build_block(&genesis, &operator, &[], 200);
        block.base.supply += 1;
        block.seal();
        let err = check_block_transfers(&ledger, &block, &[], &genesis, true).unwrap_err();
        assert!(matches!(err, ApplyError::RewardMismatch { .. }));
    }

    #[test]
    fn test_under_staked_delegate_rejected() {
        let ledger = LedgerStore::in_memory();
        let operator = keypair(1);
        ledger
            .stake(1, addr_of(&operator), MIN_STAKING_FOR_NODE - MIN_STAKING_USER, 0, 0, 0)
            .unwrap();
        let genesis = Block::genesis(
            Address::delegate(1),
            addr_of(&operator),
            1_700_000_000,
            MIN_STAKING_FOR_NODE - MIN_STAKING_USER,
        );
        let block = build_block(&genesis, &operator, &[], 200);
        let err =
            check_block_and_transfer_funds(&ledger, None, &block, &[], &genesis, true).unwrap_err();
        assert!(matches!(err, ApplyError::DelegateUnderStaked { .. }));
    }

    #[test]
    fn test_wrong_operator_rejected() {
        let (ledger, _, _, genesis) = setup(0);
        let imposter = keypair(8);
        let block = build_block(&genesis, &imposter, &[], 200);
        let err =
            check_block_and_transfer_funds(&ledger, None, &block, &[], &genesis, true).unwrap_err();
        assert!(matches!(err, ApplyError::OperatorNotOperational { .. }));
    }

    #[test]
    fn test_conservation_holds_across_two_blocks() {
        let (ledger, operator, user, genesis) = setup(10_000);
        let op_addr = addr_of(&operator);

        // Block 1: one transfer paying a 10 fee
        let tx = signed_transfer(&user, Address([0x55; 20]), 1_000, 10);
        let block1 = build_block(&genesis, &operator, &[tx.clone()], 200);
        let reward1 = compute_block_reward(genesis.base.supply);
        check_block_and_transfer_funds(&ledger, None, &block1, &[tx], &genesis, true).unwrap();

        assert_eq!(ledger.get_balance(&addr_of(&user)), 10_000 - 1_010);
        assert_eq!(ledger.get_balance(&Address([0x55; 20])), 1_000);
        // Sole staker and operator: the whole reward lands with them; the
        // 10 fee is parked until block 2
        let op_account = ledger.get_staking_account(1, &op_addr).unwrap();
        assert_eq!(op_account.staking_rewards, reward1);
        let sums = ledger.get_supply_in_accounts()
            + ledger.get_supply_staked()
            + ledger.get_supply_rewards();
        assert_eq!(sums, block1.base.supply - block1.block_fee);

        // Block 2: empty; block 1's fee reaches the operator
        let block2 = build_block(&block1, &operator, &[], 200);
        let reward2 = compute_block_reward(block1.base.supply);
        check_block_and_transfer_funds(&ledger, None, &block2, &[], &block1, true).unwrap();

        let op_account = ledger.get_staking_account(1, &op_addr).unwrap();
        assert_eq!(op_account.staking_rewards, reward1 + reward2 + 10);
        let sums = ledger.get_supply_in_accounts()
            + ledger.get_supply_staked()
            + ledger.get_supply_rewards();
        assert_eq!(sums, block2.base.supply);
    }

    #[test]
    fn test_bad_signature_rejected_only_when_strict() {
        let (ledger, operator, user, genesis) = setup(10_000);
        let mut tx = signed_transfer(&user, Address([0x55; 20]), 1_000, 10);
        tx.signature[0] ^= 1;
        tx.hash = tx.compute_hash();
        let block = build_block(&genesis, &operator, &[tx.clone()], 200);

        let err = check_block_transfers(&ledger, &block, &[tx.clone()], &genesis, true).unwrap_err();
        assert!(matches!(err, ApplyError::BadSignature(_)));
        // Non-strict replay accepts it: the Merkle root vouches for it
        check_block_transfers(&ledger, &block, &[tx], &genesis, false).unwrap();
    }

    #[test]
    fn test_resolve_transactions_reports_missing() {
        let (_, operator, user, genesis) = setup(10_000);
        let tx = signed_transfer(&user, Address([0x55; 20]), 1_000, 10);
        let block = build_block(&genesis, &operator, &[tx.clone()], 200);

        let resolved = resolve_transactions(&block, |h| (h == &tx.hash).then(|| tx.clone())).unwrap();
        assert_eq!(resolved.len(), 1);

        let err = resolve_transactions(&block, |_| None).unwrap_err();
        assert!(matches!(err, ApplyError::MissingTransaction(h) if h == tx.hash));
    }
}
