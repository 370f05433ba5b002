// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - TRANSPORT SEAM
//
// Protocol handlers speak to peers through the Transport trait; socket
// framing, dialing, and IP reputation live behind it. The in-process
// channel hub is the implementation used by tests and single-process
// multi-node setups.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::envelope::GossipMessage;
use sgy_core::MAX_PEERS;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

/// A delivered message, tagged with the sending peer's id.
pub type Delivery = (String, GossipMessage);

pub trait Transport: Send + Sync {
    /// Fan a message out to every registered peer except the sender.
    fn broadcast(&self, from: &str, msg: &GossipMessage);
    /// Deliver to one peer. Returns false if the peer is unknown or gone.
    fn send_to(&self, from: &str, peer: &str, msg: &GossipMessage) -> bool;
}

/// In-process hub: one unbounded channel per registered peer.
#[derive(Default)]
pub struct ChannelHub {
    inboxes: RwLock<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer id and get its inbox. Re-registering replaces the
    /// previous inbox.
    pub fn register(&self, id: &str) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes
            .write()
            .expect("hub lock poisoned")
            .insert(id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, id: &str) {
        self.inboxes.write().expect("hub lock poisoned").remove(id);
    }
}

impl Transport for ChannelHub {
    fn broadcast(&self, from: &str, msg: &GossipMessage) {
        let inboxes = self.inboxes.read().expect("hub lock poisoned");
        for (id, tx) in inboxes.iter() {
            if id != from {
                // A closed inbox means the peer is shutting down; skip it
                let _ = tx.send((from.to_string(), msg.clone()));
            }
        }
    }

    fn send_to(&self, from: &str, peer: &str, msg: &GossipMessage) -> bool {
        let inboxes = self.inboxes.read().expect("hub lock poisoned");
        match inboxes.get(peer) {
            Some(tx) => tx.send((from.to_string(), msg.clone())).is_ok(),
            None => false,
        }
    }
}

/// Known peers, capped at MAX_PEERS. Advertised peers beyond the cap are
/// ignored rather than evicting existing connections.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, peer: &str) -> bool {
        let mut peers = self.peers.write().expect("peer lock poisoned");
        if peers.iter().any(|p| p == peer) {
            return false;
        }
        if peers.len() >= MAX_PEERS {
            log::debug!("peer registry full, ignoring {}", peer);
            return false;
        }
        peers.push(peer.to_string());
        true
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.peers
            .read()
            .expect("peer lock poisoned")
            .iter()
            .any(|p| p == peer)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.peers.read().expect("peer lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().expect("peer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
