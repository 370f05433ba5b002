// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - NETWORK LAYER
//
// Gossip envelopes, the transport seam, chain sync, block/transaction
// flooding, the nonce proposal round, and the RPC control surface. All
// protocol services share one NodeContext; the transport is a trait so
// tests drive the whole stack over in-process channels.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod context;
pub mod envelope;
pub mod error;
pub mod gossip;
pub mod nonce;
pub mod rpc;
pub mod sync;
pub mod transport;

pub use context::NodeContext;
pub use envelope::{EnvelopeError, GossipMessage};
pub use error::NetworkError;
pub use gossip::GossipService;
pub use nonce::{NonceService, OperatorIdentity};
pub use rpc::{call_with_timeout, Opcode, RpcRequest, RpcResponse, RpcServer};
pub use sync::SyncService;
pub use transport::{ChannelHub, Delivery, PeerRegistry, Transport};

use tokio::sync::{mpsc, watch};

/// Drive one subscription inbox until the exit sentinel arrives, the
/// channel closes, or shutdown is signalled. The handler owns dispatch;
/// handler errors are logged and the loop keeps going, because one bad
/// peer message must not take the service down.
pub async fn run_subscription<F>(
    name: &str,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    mut shutdown: watch::Receiver<bool>,
    mut handler: F,
) where
    F: FnMut(&str, &GossipMessage) -> Result<(), NetworkError>,
{
    loop {
        tokio::select! {
            delivery = rx.recv() => {
                let Some((from, msg)) = delivery else {
                    log::info!("{}: inbox closed", name);
                    return;
                };
                if msg.is_exit() {
                    log::info!("{}: exit sentinel received", name);
                    return;
                }
                if let Err(err) = handler(&from, &msg) {
                    log::warn!("{}: message from {} failed: {}", name, from, err);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    log::info!("{}: shutdown", name);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_subscription_stops_on_exit_sentinel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = seen.clone();

        tx.send(("peer".to_string(), GossipMessage::new(envelope::HEAD_HI)))
            .unwrap();
        tx.send(("peer".to_string(), GossipMessage::exit())).unwrap();
        tx.send(("peer".to_string(), GossipMessage::new(envelope::HEAD_HI)))
            .unwrap();

        run_subscription("test", rx, shutdown_rx, |_, _| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .await;

        // The message after the sentinel is never dispatched
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_subscription_stops_on_shutdown() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_subscription("test", rx, shutdown_rx, |_, _| Ok(())));
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_subscription_survives_handler_errors() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = seen.clone();

        tx.send(("peer".to_string(), GossipMessage::new(envelope::HEAD_TX)))
            .unwrap();
        tx.send(("peer".to_string(), GossipMessage::new(envelope::HEAD_TX)))
            .unwrap();
        tx.send(("peer".to_string(), GossipMessage::exit())).unwrap();

        run_subscription("test", rx, shutdown_rx, |_, _| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(NetworkError::Protocol("boom".to_string()))
        })
        .await;

        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
