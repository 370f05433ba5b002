// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - GENESIS BOOTSTRAP
//
// First-start ledger seeding. Every balance and stake in the config's
// allocation table is credited, the genesis block carries their sum as
// its supply, and both are committed under height 0. On any later start
// the stored chain wins and the config table is ignored.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::config::NodeConfig;
use sgy_core::block::Block;
use sgy_core::Address;
use sgy_ledger::LedgerStore;

/// Seed the ledger from the config allocation table and commit the
/// genesis block. The caller has already checked that no chain exists.
pub fn bootstrap(ledger: &LedgerStore, config: &NodeConfig) -> Result<Block, String> {
    for alloc in &config.genesis.allocations {
        let addr = alloc.parsed_address()?;
        if alloc.balance > 0 {
            ledger.set_balance(addr, alloc.balance);
        }
        if alloc.stake > 0 {
            ledger
                .stake(alloc.slot, addr, alloc.stake, 0, 0, config.genesis.timestamp)
                .map_err(|e| format!("genesis stake for {}: {}", alloc.address, e))?;
        }
    }

    let genesis = Block::genesis(
        Address::delegate(config.genesis.delegate_slot),
        config.genesis_operator(),
        config.genesis.timestamp,
        config.premine(),
    );

    let db = ledger
        .db()
        .ok_or_else(|| "genesis bootstrap needs a database".to_string())?;
    db.put_block(&genesis)
        .map_err(|e| format!("store genesis block: {}", e))?;
    ledger
        .commit(0)
        .map_err(|e| format!("commit genesis snapshot: {}", e))?;

    log::info!(
        "genesis committed: {} allocations, premine {}",
        config.genesis.allocations.len(),
        config.premine()
    );
    Ok(genesis)
}

/// Reload the tip and ledger of an existing chain.
pub fn resume(ledger: &LedgerStore) -> Result<Option<Block>, String> {
    let db = ledger
        .db()
        .ok_or_else(|| "resume needs a database".to_string())?;
    let Some(height) = db.last_block_height().map_err(|e| e.to_string())? else {
        return Ok(None);
    };
    let loaded = ledger.load(-1).map_err(|e| format!("load snapshot: {}", e))?;
    // The last snapshot can trail the last block if the process died
    // between put_block and commit; roll the blocks back to the snapshot.
    let tip_height = if loaded < height {
        log::warn!(
            "snapshot at {} trails last block {}, truncating",
            loaded,
            height
        );
        ledger.rollback_to(loaded).map_err(|e| e.to_string())?
    } else {
        height
    };
    let tip = db
        .block_by_height(tip_height)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no block stored at height {}", tip_height))?;
    Ok(Some(tip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenesisAllocation;
    use sgy_core::MIN_STAKING_FOR_NODE;
    use std::sync::Arc;

    fn config_with_allocations() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.genesis.operator_address = "22".repeat(20);
        config.genesis.allocations = vec![
            GenesisAllocation {
                address: "22".repeat(20),
                balance: 0,
                stake: MIN_STAKING_FOR_NODE,
                slot: 1,
            },
            GenesisAllocation {
                address: "33".repeat(20),
                balance: 7_500,
                stake: 0,
                slot: 1,
            },
        ];
        config
    }

    #[test]
    fn test_bootstrap_seeds_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerStore::open(dir.path()).unwrap());
        let config = config_with_allocations();

        let genesis = bootstrap(&ledger, &config).unwrap();
        assert_eq!(genesis.height(), 0);
        assert_eq!(genesis.base.supply, MIN_STAKING_FOR_NODE + 7_500);
        assert_eq!(ledger.get_supply_staked(), MIN_STAKING_FOR_NODE);
        assert_eq!(ledger.get_supply_in_accounts(), 7_500);

        // A second process start resumes instead of reseeding
        let resumed = resume(&ledger).unwrap().unwrap();
        assert_eq!(resumed.block_hash, genesis.block_hash);
    }

    #[test]
    fn test_resume_on_empty_database_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::open(dir.path()).unwrap();
        assert!(resume(&ledger).unwrap().is_none());
    }
}
