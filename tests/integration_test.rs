// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - INTEGRATION TESTS
//
// Cross-crate scenarios:
//   1. Chain growth with transactions, supply conservation at every height
//   2. Database persistence and restart recovery
//   3. Escrow accounts: the delay-50 lifecycle through real blocks
//   4. Multisign accounts: proposal, quorum, execution
//   5. RPC control surface over a live node context
//
// Usage:
//   cargo test --test integration_test -- --nocapture
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use sgy_consensus::applicator::compute_block_reward;
use sgy_consensus::proof::valid_proof;
use sgy_core::block::Block;
use sgy_core::merkle::MerkleTree;
use sgy_core::transaction::{Transaction, TxData};
use sgy_core::{Address, BlockHash, TxHash, MIN_STAKING_FOR_NODE};
use sgy_ledger::LedgerStore;
use sgy_mempool::{MempoolSet, Routed};
use sgy_network::{NodeContext, Opcode, PeerRegistry, RpcRequest, RpcServer};
use std::sync::Arc;

const GENESIS_TS: i64 = 1_700_000_000;
const USER_FUNDS: i64 = 1_000_000;

fn keypair(seed: u8) -> sgy_crypto::KeyPair {
    sgy_crypto::keypair_from_seed(&[seed; 32])
}

fn addr_of(kp: &sgy_crypto::KeyPair) -> Address {
    Address::from_public_key(&kp.public_key)
}

fn operator() -> sgy_crypto::KeyPair {
    keypair(1)
}

fn user() -> sgy_crypto::KeyPair {
    keypair(2)
}

/// Seed a ledger with the standard test premine: the operator staked into
/// slot 1, a funded user, and the genesis block carrying their sum. On a
/// db-backed ledger the genesis is also committed under height 0.
fn seeded(ledger: &LedgerStore) -> Block {
    let op = operator();
    ledger
        .stake(1, addr_of(&op), MIN_STAKING_FOR_NODE, 0, 0, GENESIS_TS)
        .unwrap();
    ledger.set_balance(addr_of(&user()), USER_FUNDS);
    let genesis = Block::genesis(
        Address::delegate(1),
        addr_of(&op),
        GENESIS_TS,
        MIN_STAKING_FOR_NODE + USER_FUNDS,
    );
    if let Some(db) = ledger.db() {
        db.put_block(&genesis).unwrap();
        ledger.commit(0).unwrap();
    }
    genesis
}

fn signed_transfer(kp: &sgy_crypto::KeyPair, recipient: Address, amount: i64, height: i64) -> Transaction {
    let mut tx = Transaction {
        sender: addr_of(kp),
        recipient,
        amount,
        fee: 10,
        height,
        timestamp: GENESIS_TS + height,
        data: TxData::Transfer,
        public_key: vec![],
        signature: vec![],
        hash: BlockHash::ZERO,
    };
    tx.sign(kp).unwrap();
    tx
}

/// Child block carrying `txs`, valid through the whole acceptance path,
/// proof included.
fn child_block(last: &Block, txs: &[Transaction]) -> Block {
    let op = operator();
    let hashes: Vec<TxHash> = txs.iter().map(|t| t.hash).collect();
    let mut block = last.clone();
    block.base.header.previous_hash = last.block_hash;
    block.base.header.height = last.height() + 1;
    block.base.header.delegated_account = Address::delegate(1);
    block.base.header.operator_account = addr_of(&op);
    block.base.header.root_merkle_tree = MerkleTree::build(&hashes).root();
    block.base.timestamp = last.base.timestamp + 10;
    block.base.reward_percentage = 200;
    block.base.supply = last.base.supply + compute_block_reward(last.base.supply);
    block.transaction_hashes = hashes;
    block.block_fee = txs.iter().map(|t| t.fee).sum();
    loop {
        block.base.header.sign(&op).unwrap();
        block.seal();
        if valid_proof(&block.base.block_header_hash, block.base.header.difficulty) {
            return block;
        }
        // On a proof miss, nudge a signed field to get a new header hash
        block.base.header.difficulty -= 1;
    }
}

fn circulating(ledger: &LedgerStore) -> i64 {
    ledger.get_supply_in_accounts() + ledger.get_supply_staked() + ledger.get_supply_rewards()
}

// ════════════════════════════════════════════════════════════════════════
// TEST 1: CHAIN GROWTH + SUPPLY CONSERVATION
// ════════════════════════════════════════════════════════════════════════

#[test]
fn test_chain_growth_conserves_supply() {
    println!("\n🧪 TEST 1: Chain Growth + Supply Conservation");
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(LedgerStore::open(dir.path()).unwrap());
    let genesis = seeded(&ledger);
    let ctx = NodeContext::new(ledger.clone(), Arc::new(MempoolSet::new()), genesis.clone());

    let recipient = Address([0xaa; 20]);
    let txs = vec![
        signed_transfer(&user(), recipient, 1_000, 1),
        signed_transfer(&user(), Address([0xab; 20]), 2_000, 1),
    ];
    let block1 = child_block(&genesis, &txs);
    ctx.try_apply_block(&block1, &txs, true).unwrap();
    println!("  ✓ block 1 applied with {} transactions", txs.len());

    // block 1's fees (20) are in flight until block 2 credits them
    assert_eq!(circulating(&ledger), block1.base.supply - block1.block_fee);
    assert_eq!(ledger.get_balance(&recipient), 1_000);
    assert_eq!(
        ledger.get_balance(&addr_of(&user())),
        USER_FUNDS - 1_000 - 2_000 - 20
    );

    let block2 = child_block(&block1, &[]);
    ctx.try_apply_block(&block2, &[], true).unwrap();
    assert_eq!(circulating(&ledger), block2.base.supply);
    println!("  ✓ circulating supply matches declared supply at height 2");

    // The operator staked the whole slot, so both rewards plus block 1's
    // carried fees land in its staking rewards
    let reward1 = compute_block_reward(genesis.base.supply);
    let reward2 = compute_block_reward(block1.base.supply);
    assert_eq!(ledger.get_supply_rewards(), reward1 + reward2 + block1.block_fee);
    assert_eq!(ctx.state.height(), 2);
    println!("  ✓ rewards accrued: {} + {} + {} fee", reward1, reward2, block1.block_fee);
}

// ════════════════════════════════════════════════════════════════════════
// TEST 2: DATABASE PERSISTENCE & RESTART RECOVERY
// ════════════════════════════════════════════════════════════════════════

#[test]
fn test_restart_recovers_committed_state() {
    println!("\n🧪 TEST 2: Database Persistence & Restart Recovery");
    let dir = tempfile::tempdir().unwrap();
    let recipient = Address([0xcc; 20]);
    let (tip_hash, user_balance) = {
        let ledger = Arc::new(LedgerStore::open(dir.path()).unwrap());
        let genesis = seeded(&ledger);
        let ctx = NodeContext::new(ledger.clone(), Arc::new(MempoolSet::new()), genesis.clone());

        let txs = vec![signed_transfer(&user(), recipient, 5_000, 1)];
        let block1 = child_block(&genesis, &txs);
        ctx.try_apply_block(&block1, &txs, true).unwrap();
        let block2 = child_block(&block1, &[]);
        ctx.try_apply_block(&block2, &[], true).unwrap();

        ledger.db().unwrap().flush().unwrap();
        println!("  ✓ chain grown to height 2 and flushed");
        (block2.block_hash, ledger.get_balance(&addr_of(&user())))
    };
    // First process is gone; a second one opens the same directory

    let ledger = LedgerStore::open(dir.path()).unwrap();
    let loaded = ledger.load(-1).unwrap();
    assert_eq!(loaded, 2);
    assert_eq!(ledger.get_balance(&recipient), 5_000);
    assert_eq!(ledger.get_balance(&addr_of(&user())), user_balance);

    let db = ledger.db().unwrap();
    assert_eq!(db.last_block_height().unwrap(), Some(2));
    assert_eq!(db.block_by_height(2).unwrap().unwrap().block_hash, tip_hash);
    println!("  ✓ reopened ledger restored height, balances, and tip");
}

// ════════════════════════════════════════════════════════════════════════
// TEST 3: ESCROW DELAY-50 LIFECYCLE
// ════════════════════════════════════════════════════════════════════════

#[test]
fn test_escrow_delay_50_lifecycle() {
    println!("\n🧪 TEST 3: Escrow Delay-50 Lifecycle");
    let ledger = Arc::new(LedgerStore::in_memory());
    let genesis = seeded(&ledger);
    let mempool = Arc::new(MempoolSet::new());
    let ctx = NodeContext::new(ledger.clone(), mempool.clone(), genesis.clone());

    // The user flips their account into escrow mode with delay 50
    let mut account = ledger.get_account(&addr_of(&user())).unwrap();
    account.set_transaction_delay(50).unwrap();
    ledger.set_account(account);

    let recipient = Address([0xdd; 20]);
    let tx = signed_transfer(&user(), recipient, 400, 1);
    assert_eq!(ctx.submit_transaction(tx.clone()).unwrap(), Routed::Escrow);
    assert_eq!(mempool.counts(), (0, 1, 0));
    println!("  ✓ transaction parked in escrow");

    // Release condition: tx.height 1 + delay 50 <= block height
    let mut tip = genesis;
    for _ in 0..51 {
        let block = child_block(&tip, &[]);
        ctx.try_apply_block(&block, &[], true).unwrap();
        tip = block;
    }
    assert_eq!(mempool.counts(), (1, 0, 0));
    assert_eq!(ledger.get_balance(&recipient), 0, "not executed yet");
    println!("  ✓ released into the standard pool at height 51");

    let released = mempool.peek_standard(10);
    assert_eq!(released.len(), 1);
    let block = child_block(&tip, &released);
    ctx.try_apply_block(&block, &released, true).unwrap();
    assert_eq!(ledger.get_balance(&recipient), 400);
    assert_eq!(mempool.counts(), (0, 0, 0));
    println!("  ✓ executed at height 52, pools drained");
}

// ════════════════════════════════════════════════════════════════════════
// TEST 4: MULTISIGN PROPOSAL, QUORUM, EXECUTION
// ════════════════════════════════════════════════════════════════════════

#[test]
fn test_multisign_quorum_then_execution() {
    println!("\n🧪 TEST 4: Multisign Proposal, Quorum, Execution");
    let ledger = Arc::new(LedgerStore::in_memory());
    let genesis = seeded(&ledger);
    let mempool = Arc::new(MempoolSet::new());
    let ctx = NodeContext::new(ledger.clone(), mempool.clone(), genesis.clone());

    // The user requires 2 of 2 co-signers for outgoing transactions
    let cosigner_a = keypair(5);
    let cosigner_b = keypair(6);
    let mut account = ledger.get_account(&addr_of(&user())).unwrap();
    account
        .set_multi_sign(2, vec![addr_of(&cosigner_a), addr_of(&cosigner_b)])
        .unwrap();
    ledger.set_account(account);

    let recipient = Address([0xee; 20]);
    let main_tx = signed_transfer(&user(), recipient, 700, 1);
    assert_eq!(
        ctx.submit_transaction(main_tx.clone()).unwrap(),
        Routed::MultiSign
    );
    println!("  ✓ proposal parked in the multisign pool");

    let approve = |kp: &sgy_crypto::KeyPair| {
        let mut tx = Transaction {
            sender: addr_of(kp),
            recipient: addr_of(kp),
            amount: 0,
            fee: 0,
            height: 1,
            timestamp: GENESIS_TS + 1,
            data: TxData::MultiSignApprove {
                main_hash: main_tx.hash,
            },
            public_key: vec![],
            signature: vec![],
            hash: BlockHash::ZERO,
        };
        tx.sign(kp).unwrap();
        tx
    };

    assert!(matches!(
        ctx.submit_transaction(approve(&cosigner_a)).unwrap(),
        Routed::Approval { .. }
    ));
    match ctx.submit_transaction(approve(&cosigner_b)).unwrap() {
        Routed::Quorum(main) => assert_eq!(main.hash, main_tx.hash),
        other => panic!("expected quorum, got {:?}", other),
    }
    // Quorum promoted the proposal into the standard pool
    assert_eq!(mempool.counts(), (1, 0, 0));
    println!("  ✓ quorum of 2 reached, proposal promoted");

    let released = mempool.peek_standard(10);
    let block = child_block(&genesis, &released);
    ctx.try_apply_block(&block, &released, true).unwrap();
    assert_eq!(ledger.get_balance(&recipient), 700);
    println!("  ✓ executed in block 1");
}

// ════════════════════════════════════════════════════════════════════════
// TEST 5: RPC CONTROL SURFACE
// ════════════════════════════════════════════════════════════════════════

#[test]
fn test_rpc_surface_end_to_end() {
    println!("\n🧪 TEST 5: RPC Control Surface");
    let ledger = Arc::new(LedgerStore::in_memory());
    let genesis = seeded(&ledger);
    let ctx = Arc::new(NodeContext::new(
        ledger.clone(),
        Arc::new(MempoolSet::new()),
        genesis,
    ));
    // The operator and user keys are the node's registered control keys
    let rpc = RpcServer::new(
        ctx.clone(),
        Arc::new(PeerRegistry::new()),
        false,
        vec![operator().public_key, user().public_key],
    );

    let stat = rpc.dispatch(&RpcRequest::unsigned(Opcode::Stat, vec![]));
    assert_eq!(stat.tag, "OK");
    let body: serde_json::Value = serde_json::from_slice(&stat.payload).unwrap();
    assert_eq!(body["height"], 0);
    assert_eq!(body["supply"], MIN_STAKING_FOR_NODE + USER_FUNDS);
    println!("  ✓ STAT reports height and supply");

    // Signed submission path
    let tx = signed_transfer(&user(), Address([0xaf; 20]), 50, 1);
    let mut req = RpcRequest::unsigned(Opcode::Tran, bincode::serialize(&tx).unwrap());
    req.sign(&user()).unwrap();
    let resp = rpc.dispatch(&req);
    assert_eq!(resp.tag, "TX");
    println!("  ✓ TRAN accepted a signed transfer");

    let pend = rpc.dispatch(&RpcRequest::unsigned(Opcode::Pend, vec![]));
    let body: serde_json::Value = serde_json::from_slice(&pend.payload).unwrap();
    assert_eq!(body["standard"], 1);

    // Submission only pools the transaction; balances move on inclusion
    let mut req = RpcRequest::unsigned(Opcode::Acct, addr_of(&user()).as_bytes().to_vec());
    req.sign(&user()).unwrap();
    let resp = rpc.dispatch(&req);
    assert_eq!(resp.tag, "AC");
    let body: serde_json::Value = serde_json::from_slice(&resp.payload).unwrap();
    assert_eq!(body["balance"], USER_FUNDS);
    println!("  ✓ PEND and ACCT agree: pooled, not yet executed");

    // A consistent signature from a key the node never registered is
    // still refused and must not reach the handler
    let stranger = keypair(9);
    let mut req = RpcRequest::unsigned(Opcode::Mine, vec![]);
    req.sign(&stranger).unwrap();
    assert_eq!(rpc.dispatch(&req).tag, "ER");
    assert!(!rpc.is_producing());
    let mut req = RpcRequest::unsigned(Opcode::Acct, addr_of(&user()).as_bytes().to_vec());
    req.sign(&stranger).unwrap();
    assert_eq!(rpc.dispatch(&req).tag, "ER");
    println!("  ✓ unregistered signing keys are refused");
}
