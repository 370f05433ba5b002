// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - NODE CONFIGURATION
//
// TOML node config: identity, data directory, seed peers, the optional
// operator section, and the genesis allocation table used on first start.
// Everything has a default so a bare `sgy-node` starts a fresh
// non-operator node in ./sgy-data.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::Deserialize;
use sgy_core::Address;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Peer id this node announces itself under.
    pub node_id: String,
    /// Sled data directory.
    pub data_dir: String,
    /// Seed peers to announce to on startup.
    pub peers: Vec<String>,
    /// Whether this node joins proposal rounds (requires [operator]).
    pub produce_blocks: bool,
    /// Hex-encoded public keys allowed to issue signed RPC opcodes, on
    /// top of the operator key.
    pub rpc_keys: Vec<String>,
    pub operator: Option<OperatorConfig>,
    pub genesis: GenesisConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "sgy-node".to_string(),
            data_dir: "./sgy-data".to_string(),
            peers: Vec::new(),
            produce_blocks: false,
            rpc_keys: Vec::new(),
            operator: None,
            genesis: GenesisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Delegate slot this node operates (1..=255).
    pub slot: u8,
    /// Hex-encoded 32-byte signing seed.
    pub secret_key: String,
    /// Operator share of the block reward, in thousandths.
    #[serde(default = "default_reward_percentage")]
    pub reward_percentage: i32,
}

fn default_reward_percentage() -> i32 {
    200
}

impl OperatorConfig {
    pub fn keypair(&self) -> Result<sgy_crypto::KeyPair, String> {
        let bytes = hex::decode(&self.secret_key)
            .map_err(|e| format!("operator.secret_key is not hex: {}", e))?;
        sgy_crypto::keypair_from_secret(&bytes).map_err(|e| e.to_string())
    }
}

/// First-start ledger seed. Ignored once a chain database exists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenesisConfig {
    pub timestamp: i64,
    /// Delegate slot named in the genesis header.
    pub delegate_slot: u8,
    /// Hex address recorded as the genesis operator.
    pub operator_address: String,
    pub allocations: Vec<GenesisAllocation>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            timestamp: 1_700_000_000,
            delegate_slot: 1,
            operator_address: String::new(),
            allocations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenesisAllocation {
    /// Hex-encoded 20-byte address.
    pub address: String,
    /// Spendable balance premined to the account.
    pub balance: i64,
    /// Amount staked into `slot` at genesis.
    pub stake: i64,
    pub slot: u8,
}

impl Default for GenesisAllocation {
    fn default() -> Self {
        Self {
            address: String::new(),
            balance: 0,
            stake: 0,
            slot: 1,
        }
    }
}

impl GenesisAllocation {
    pub fn parsed_address(&self) -> Result<Address, String> {
        let bytes = hex::decode(&self.address)
            .map_err(|e| format!("allocation address {} is not hex: {}", self.address, e))?;
        Address::from_slice(&bytes)
            .ok_or_else(|| format!("allocation address {} is not 20 bytes", self.address))
    }
}

impl NodeConfig {
    pub fn load(path: &str) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path, e))?;
        let config: NodeConfig =
            toml::from_str(&raw).map_err(|e| format!("cannot parse config {}: {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.is_empty() {
            return Err("node_id must not be empty".to_string());
        }
        if let Some(op) = &self.operator {
            if op.slot == 0 {
                return Err("operator.slot 0 is not a delegate slot".to_string());
            }
            if !(0..=1000).contains(&op.reward_percentage) {
                return Err(format!(
                    "operator.reward_percentage {} outside 0..=1000",
                    op.reward_percentage
                ));
            }
            op.keypair()?;
        }
        if self.produce_blocks && self.operator.is_none() {
            return Err("produce_blocks requires an [operator] section".to_string());
        }
        self.rpc_public_keys()?;
        for alloc in &self.genesis.allocations {
            alloc.parsed_address()?;
            if alloc.balance < 0 || alloc.stake < 0 {
                return Err(format!(
                    "allocation {} has a negative amount",
                    alloc.address
                ));
            }
            if alloc.stake > 0 && alloc.slot == 0 {
                return Err(format!("allocation {} stakes into slot 0", alloc.address));
            }
        }
        if !self.genesis.operator_address.is_empty() {
            let bytes = hex::decode(&self.genesis.operator_address)
                .map_err(|e| format!("genesis.operator_address is not hex: {}", e))?;
            if bytes.len() != 20 {
                return Err("genesis.operator_address is not 20 bytes".to_string());
            }
        }
        Ok(())
    }

    /// Total premined supply: the sum of every allocation's balance and
    /// stake. The genesis block carries this as its supply.
    pub fn premine(&self) -> i64 {
        self.genesis
            .allocations
            .iter()
            .map(|a| a.balance + a.stake)
            .sum()
    }

    /// Decoded RPC control keys from `rpc_keys`.
    pub fn rpc_public_keys(&self) -> Result<Vec<Vec<u8>>, String> {
        self.rpc_keys
            .iter()
            .map(|key| hex::decode(key).map_err(|e| format!("rpc_keys entry {} is not hex: {}", key, e)))
            .collect()
    }

    pub fn genesis_operator(&self) -> Address {
        if self.genesis.operator_address.is_empty() {
            return Address::ZERO;
        }
        hex::decode(&self.genesis.operator_address)
            .ok()
            .and_then(|b| Address::from_slice(&b))
            .unwrap_or(Address::ZERO)
    }
}
