// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - RPC CONTROL PROTOCOL
//
// 4-byte opcodes as a closed enum with an exhaustive dispatch table. A
// short allow-list of read-only opcodes goes unsigned; everything else
// must be signed over the length-prefixed body by one of the node's
// registered control keys. Responses carry a
// two-letter type tag; callers racing a deadline substitute the
// "Timeout" sentinel rather than blocking.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::context::NodeContext;
use crate::error::NetworkError;
use crate::transport::PeerRegistry;
use serde_json::json;
use sgy_core::transaction::Transaction;
use sgy_core::{Address, BlockHash};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Node status: height, sync flag, supply, pool sizes.
    Stat,
    /// Submit a transaction.
    Tran,
    /// Full account details.
    Dets,
    /// Staking-account details for one delegate slot.
    Stak,
    /// Account balance.
    Acct,
    /// DEX account details.
    Adex,
    /// Current encryption-scheme descriptors.
    Encr,
    /// Record an encryption-scheme vote payload.
    Vote,
    /// Cancel a still-pending transaction.
    Cncl,
    /// Toggle block production participation.
    Mine,
    /// Pending-pool contents.
    Pend,
    /// Known peer list.
    Peer,
}

impl Opcode {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"STAT" => Some(Self::Stat),
            b"TRAN" => Some(Self::Tran),
            b"DETS" => Some(Self::Dets),
            b"STAK" => Some(Self::Stak),
            b"ACCT" => Some(Self::Acct),
            b"ADEX" => Some(Self::Adex),
            b"ENCR" => Some(Self::Encr),
            b"VOTE" => Some(Self::Vote),
            b"CNCL" => Some(Self::Cncl),
            b"MINE" => Some(Self::Mine),
            b"PEND" => Some(Self::Pend),
            b"PEER" => Some(Self::Peer),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &'static [u8; 4] {
        match self {
            Self::Stat => b"STAT",
            Self::Tran => b"TRAN",
            Self::Dets => b"DETS",
            Self::Stak => b"STAK",
            Self::Acct => b"ACCT",
            Self::Adex => b"ADEX",
            Self::Encr => b"ENCR",
            Self::Vote => b"VOTE",
            Self::Cncl => b"CNCL",
            Self::Mine => b"MINE",
            Self::Pend => b"PEND",
            Self::Peer => b"PEER",
        }
    }

    /// Read-only opcodes any caller may issue unsigned.
    pub fn requires_signature(&self) -> bool {
        !matches!(self, Self::Stat | Self::Pend | Self::Peer)
    }
}

#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub opcode: Opcode,
    pub body: Vec<u8>,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl RpcRequest {
    pub fn unsigned(opcode: Opcode, body: Vec<u8>) -> Self {
        Self {
            opcode,
            body,
            public_key: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Signature input: opcode ‖ u32 body length ‖ body.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.body.len());
        out.extend_from_slice(self.opcode.as_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn sign(&mut self, keypair: &sgy_crypto::KeyPair) -> Result<(), NetworkError> {
        self.public_key = keypair.public_key.clone();
        self.signature = sgy_crypto::sign_message(&self.signing_bytes(), &keypair.secret_key)?;
        Ok(())
    }

    pub fn verify(&self) -> bool {
        !self.public_key.is_empty()
            && sgy_crypto::verify_signature(&self.signing_bytes(), &self.signature, &self.public_key)
    }

    fn signer_address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    /// "AC" account, "TX" transaction, "BL" block/chain, "OK" plain ack,
    /// "ER" error, "Timeout" client-side deadline.
    pub tag: &'static str,
    pub payload: Vec<u8>,
}

impl RpcResponse {
    fn tagged(tag: &'static str, payload: serde_json::Value) -> Self {
        Self {
            tag,
            payload: payload.to_string().into_bytes(),
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self::tagged("ER", json!({ "error": message.to_string() }))
    }

    pub fn timeout() -> Self {
        Self {
            tag: "Timeout",
            payload: Vec::new(),
        }
    }
}

pub struct RpcServer {
    ctx: Arc<NodeContext>,
    peers: Arc<PeerRegistry>,
    /// Public keys allowed to issue signed opcodes.
    registered: Vec<Vec<u8>>,
    /// Whether this node participates in proposal rounds; MINE toggles it.
    producing: AtomicBool,
    /// Opaque scheme-vote payloads collected for the vote registry.
    vote_log: RwLock<Vec<Vec<u8>>>,
}

impl RpcServer {
    pub fn new(
        ctx: Arc<NodeContext>,
        peers: Arc<PeerRegistry>,
        producing: bool,
        registered: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            ctx,
            peers,
            registered,
            producing: AtomicBool::new(producing),
            vote_log: RwLock::new(Vec::new()),
        }
    }

    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::SeqCst)
    }

    fn is_registered(&self, public_key: &[u8]) -> bool {
        self.registered.iter().any(|k| k == public_key)
    }

    pub fn dispatch(&self, req: &RpcRequest) -> RpcResponse {
        if req.opcode.requires_signature() {
            if !req.verify() {
                return RpcResponse::error("signature required");
            }
            if !self.is_registered(&req.public_key) {
                return RpcResponse::error("unknown signing key");
            }
        }
        match req.opcode {
            Opcode::Stat => self.stat(),
            Opcode::Tran => self.tran(req),
            Opcode::Dets => self.dets(req),
            Opcode::Stak => self.stak(req),
            Opcode::Acct => self.acct(req),
            Opcode::Adex => self.adex(req),
            Opcode::Encr => self.encr(),
            Opcode::Vote => self.vote(req),
            Opcode::Cncl => self.cncl(req),
            Opcode::Mine => self.mine(),
            Opcode::Pend => self.pend(),
            Opcode::Peer => self.peer(),
        }
    }

    fn stat(&self) -> RpcResponse {
        let tip = self.ctx.tip();
        let (standard, escrow, multisign) = self.ctx.mempool.counts();
        RpcResponse::tagged(
            "OK",
            json!({
                "height": self.ctx.state.height(),
                "syncing": self.ctx.state.is_syncing(),
                "supply": tip.base.supply,
                "block_hash": tip.block_hash.to_string(),
                "mempool": { "standard": standard, "escrow": escrow, "multisign": multisign },
            }),
        )
    }

    fn tran(&self, req: &RpcRequest) -> RpcResponse {
        let tx: Transaction = match bincode::deserialize(&req.body) {
            Ok(tx) => tx,
            Err(err) => return RpcResponse::error(err),
        };
        let hash = tx.hash;
        match self.ctx.submit_transaction(tx) {
            Ok(routed) => RpcResponse::tagged(
                "TX",
                json!({ "hash": hash.to_string(), "routed": format!("{:?}", routed) }),
            ),
            Err(err) => RpcResponse::error(err),
        }
    }

    fn parse_address(body: &[u8]) -> Option<Address> {
        <[u8; 20]>::try_from(body).ok().map(Address)
    }

    fn dets(&self, req: &RpcRequest) -> RpcResponse {
        let Some(addr) = Self::parse_address(&req.body) else {
            return RpcResponse::error("body must be a 20-byte address");
        };
        match self.ctx.ledger.get_account(&addr) {
            Some(account) => match serde_json::to_value(&account) {
                Ok(value) => RpcResponse::tagged("AC", value),
                Err(err) => RpcResponse::error(err),
            },
            None => RpcResponse::error("unknown account"),
        }
    }

    fn stak(&self, req: &RpcRequest) -> RpcResponse {
        // slot byte followed by the staker address
        if req.body.len() != 21 {
            return RpcResponse::error("body must be slot byte + 20-byte address");
        }
        let slot = req.body[0];
        let Some(addr) = Self::parse_address(&req.body[1..]) else {
            return RpcResponse::error("bad address");
        };
        match self.ctx.ledger.get_staking_account(slot, &addr) {
            Some(account) => match serde_json::to_value(&account) {
                Ok(value) => RpcResponse::tagged("AC", value),
                Err(err) => RpcResponse::error(err),
            },
            None => RpcResponse::error("no staking account in that slot"),
        }
    }

    fn acct(&self, req: &RpcRequest) -> RpcResponse {
        let Some(addr) = Self::parse_address(&req.body) else {
            return RpcResponse::error("body must be a 20-byte address");
        };
        RpcResponse::tagged(
            "AC",
            json!({
                "address": addr.to_string(),
                "balance": self.ctx.ledger.get_balance(&addr),
            }),
        )
    }

    fn adex(&self, req: &RpcRequest) -> RpcResponse {
        let Some(addr) = Self::parse_address(&req.body) else {
            return RpcResponse::error("body must be a 20-byte address");
        };
        match self.ctx.ledger.get_dex_account(&addr) {
            Some(account) => match serde_json::to_value(&account) {
                Ok(value) => RpcResponse::tagged("AC", value),
                Err(err) => RpcResponse::error(err),
            },
            None => RpcResponse::error("unknown DEX account"),
        }
    }

    fn encr(&self) -> RpcResponse {
        let tip = self.ctx.tip();
        RpcResponse::tagged(
            "BL",
            json!({
                "height": tip.height(),
                "config1": hex::encode(&tip.base.header.encryption_config1),
                "config2": hex::encode(&tip.base.header.encryption_config2),
            }),
        )
    }

    fn vote(&self, req: &RpcRequest) -> RpcResponse {
        self.vote_log
            .write()
            .expect("vote log poisoned")
            .push(req.body.clone());
        RpcResponse::tagged("OK", json!({ "recorded": true }))
    }

    fn cncl(&self, req: &RpcRequest) -> RpcResponse {
        let Ok(bytes) = <[u8; 32]>::try_from(req.body.as_slice()) else {
            return RpcResponse::error("body must be a 32-byte transaction hash");
        };
        let hash = BlockHash(bytes);
        match self.ctx.cancel_transaction(&hash, &req.signer_address()) {
            Ok(true) => RpcResponse::tagged("TX", json!({ "cancelled": hash.to_string() })),
            Ok(false) => RpcResponse::error("transaction not pending"),
            Err(err) => RpcResponse::error(err),
        }
    }

    fn mine(&self) -> RpcResponse {
        let now = !self.producing.load(Ordering::SeqCst);
        self.producing.store(now, Ordering::SeqCst);
        RpcResponse::tagged("OK", json!({ "producing": now }))
    }

    fn pend(&self) -> RpcResponse {
        let (standard, escrow, multisign) = self.ctx.mempool.counts();
        let hashes: Vec<String> = self
            .ctx
            .mempool
            .peek_standard(100)
            .iter()
            .map(|t| t.hash.to_string())
            .collect();
        RpcResponse::tagged(
            "TX",
            json!({
                "standard": standard,
                "escrow": escrow,
                "multisign": multisign,
                "head": hashes,
            }),
        )
    }

    fn peer(&self) -> RpcResponse {
        RpcResponse::tagged("OK", json!({ "peers": self.peers.snapshot() }))
    }

    pub fn vote_payloads(&self) -> Vec<Vec<u8>> {
        self.vote_log.read().expect("vote log poisoned").clone()
    }
}

/// Client-side deadline: an unresponsive peer yields the "Timeout"
/// sentinel instead of blocking the caller indefinitely.
pub async fn call_with_timeout<F>(deadline: Duration, call: F) -> RpcResponse
where
    F: Future<Output = RpcResponse>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(response) => response,
        Err(_) => RpcResponse::timeout(),
    }
}
