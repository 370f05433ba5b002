// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - NODE
//
// Entry point for the sgy-node binary. Opens the chain database, seeds
// or resumes the ledger, and runs the protocol services over the message
// hub: sync announces, transaction/block gossip, the nonce proposal
// round, and a small operator console on stdin.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod config;
mod genesis;

use config::NodeConfig;
use sgy_core::BLOCK_INTERVAL_SECS;
use sgy_network::envelope::*;
use sgy_network::{
    run_subscription, ChannelHub, GossipService, NodeContext, NonceService, Opcode,
    OperatorIdentity, PeerRegistry, RpcRequest, RpcServer, SyncService, Transport,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

const DEFAULT_CONFIG_PATH: &str = "sgy_config.toml";

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn load_config() -> Result<NodeConfig, String> {
    match std::env::args().nth(1) {
        Some(path) => NodeConfig::load(&path),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            NodeConfig::load(DEFAULT_CONFIG_PATH)
        }
        None => Ok(NodeConfig::default()),
    }
}

#[tokio::main]
async fn main() {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  SYNERGY (SGY) NODE v{}", env!("CARGO_PKG_VERSION"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if let Err(err) = run().await {
        eprintln!("fatal: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg = load_config()?;
    println!("node id:   {}", cfg.node_id);
    println!("data dir:  {}", cfg.data_dir);

    let ledger = Arc::new(
        sgy_ledger::LedgerStore::open(&cfg.data_dir).map_err(|e| format!("open ledger: {}", e))?,
    );
    let tip = match genesis::resume(&ledger)? {
        Some(tip) => {
            println!("resumed:   height {}", tip.height());
            tip
        }
        None => {
            let tip = genesis::bootstrap(&ledger, &cfg)?;
            println!("genesis:   supply {}", tip.base.supply);
            tip
        }
    };

    let mempool = Arc::new(sgy_mempool::MempoolSet::new());
    let ctx = Arc::new(NodeContext::new(ledger.clone(), mempool, tip));

    let hub = Arc::new(ChannelHub::new());
    let inbox = hub.register(&cfg.node_id);
    let peers = Arc::new(PeerRegistry::new());
    for peer in &cfg.peers {
        peers.add(peer);
    }

    let identity = match &cfg.operator {
        Some(op) => {
            let keypair = op.keypair()?;
            println!("operator:  slot {} ({})", op.slot, hex::encode(&keypair.public_key));
            Some(OperatorIdentity {
                slot: op.slot,
                keypair,
                reward_percentage: op.reward_percentage,
            })
        }
        None => None,
    };
    let operator_keypair = cfg.operator.as_ref().map(|op| op.keypair()).transpose()?;

    // Signed RPC opcodes are accepted from the configured control keys
    // and the operator key.
    let mut rpc_keys = cfg.rpc_public_keys()?;
    if let Some(keypair) = &operator_keypair {
        rpc_keys.push(keypair.public_key.clone());
    }

    let sync = Arc::new(SyncService::new(ctx.clone(), hub.clone(), peers.clone(), &cfg.node_id));
    let gossip = Arc::new(GossipService::new(ctx.clone(), hub.clone(), &cfg.node_id));
    let nonce = Arc::new(NonceService::new(ctx.clone(), hub.clone(), &cfg.node_id, identity));
    let rpc = Arc::new(RpcServer::new(ctx.clone(), peers.clone(), cfg.produce_blocks, rpc_keys));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Inbound protocol loop: one inbox, dispatched by message head.
    let dispatcher = {
        let sync = sync.clone();
        let gossip = gossip.clone();
        let nonce = nonce.clone();
        let name = cfg.node_id.clone();
        tokio::spawn(run_subscription(
            "protocol",
            inbox,
            shutdown_rx.clone(),
            move |from, msg| match msg.head {
                HEAD_HI => sync.handle_hi(from, msg),
                HEAD_GH => sync.handle_gh(from, msg),
                HEAD_SH => sync.handle_sh(from, msg),
                HEAD_ST => sync.handle_st(from, msg),
                HEAD_BT => sync.handle_bt(msg),
                HEAD_BX => sync.handle_bx(msg),
                HEAD_TX => gossip.handle_tx(msg),
                HEAD_BL => gossip.handle_bl(from, msg),
                HEAD_NN => nonce.handle_nonce(msg).map(|_| ()),
                other => {
                    log::debug!("{}: unknown head {:?} from {}", name, other, from);
                    Ok(())
                }
            },
        ))
    };

    // Height announce ticker.
    let announcer = {
        let sync = sync.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(BLOCK_INTERVAL_SECS as u64));
            loop {
                tokio::select! {
                    _ = ticker.tick() => sync.announce(),
                    _ = shutdown.changed() => return,
                }
            }
        })
    };

    // Proposal round ticker: operator nodes broadcast their nonce once
    // per block interval while production is switched on.
    let proposer = {
        let nonce = nonce.clone();
        let rpc = rpc.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(BLOCK_INTERVAL_SECS as u64));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if rpc.is_producing() {
                            if let Err(err) = nonce.broadcast_nonce(unix_now()) {
                                log::warn!("nonce round failed: {}", err);
                            }
                        }
                    }
                    _ = shutdown.changed() => return,
                }
            }
        })
    };

    console(&rpc, operator_keypair.as_ref()).await;

    println!("shutting down");
    let _ = shutdown_tx.send(true);
    hub.broadcast("", &sgy_network::GossipMessage::exit());
    let _ = tokio::join!(dispatcher, announcer, proposer);
    if let Some(db) = ledger.db() {
        db.flush().map_err(|e| format!("flush: {}", e))?;
    }
    println!("bye");
    Ok(())
}

/// Operator console: a line-oriented front end over the RPC dispatch
/// table. Unsigned opcodes work as-is; signed ones use the operator key.
async fn console(rpc: &RpcServer, operator: Option<&sgy_crypto::KeyPair>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("commands: stat | pend | peer | mine | quit");
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => return,
        };
        let Ok(Some(line)) = line else { return };
        let response = match line.trim() {
            "" => continue,
            "quit" | "exit" => return,
            "stat" => rpc.dispatch(&RpcRequest::unsigned(Opcode::Stat, vec![])),
            "pend" => rpc.dispatch(&RpcRequest::unsigned(Opcode::Pend, vec![])),
            "peer" => rpc.dispatch(&RpcRequest::unsigned(Opcode::Peer, vec![])),
            "mine" => {
                let Some(keypair) = operator else {
                    println!("mine needs an [operator] config section");
                    continue;
                };
                let mut req = RpcRequest::unsigned(Opcode::Mine, vec![]);
                match req.sign(keypair) {
                    Ok(()) => rpc.dispatch(&req),
                    Err(err) => {
                        println!("cannot sign: {}", err);
                        continue;
                    }
                }
            }
            other => {
                println!("unknown command: {}", other);
                continue;
            }
        };
        println!("[{}] {}", response.tag, String::from_utf8_lossy(&response.payload));
    }
}
