//! Message fan-out to peers.

use std::sync::Arc;

use beacon_core::{ClientId, Message};
use metrics::counter;
use tracing::{debug, warn};

use super::registry::SessionRegistry;
use super::session::SendError;

/// Delivers messages to one or many sessions with the sender excluded.
///
/// Every delivery is a non-blocking enqueue onto the target's bounded
/// queue, so one stalled peer cannot hold up the rest of a fan-out or
/// the sender's own dispatch loop. A peer that keeps its queue full past
/// `max_send_drops` is treated as dead and force-closed.
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    max_send_drops: u64,
}

impl Broadcaster {
    /// Create a broadcaster over the shared registry.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, max_send_drops: u64) -> Self {
        Self {
            registry,
            max_send_drops,
        }
    }

    /// Deliver `message` to every live session except `from`.
    ///
    /// Serializes once and shares the payload across targets. Per-target
    /// failures are contained: they evict that target at worst and never
    /// surface to the caller.
    pub async fn broadcast(&self, from: ClientId, message: &Message) {
        let payload = Arc::new(message.encode());
        let mut recipients = 0u32;
        let mut to_evict = Vec::new();

        for target in self.registry.snapshot().await {
            if target.id == from {
                continue;
            }
            match target.send_encoded(Arc::clone(&payload)) {
                Ok(()) => recipients += 1,
                Err(SendError::QueueFull) => {
                    counter!("ws_broadcast_drops_total").increment(1);
                    let drops = target.drop_count();
                    if drops >= self.max_send_drops {
                        warn!(client_id = %target.id, drops, "evicting slow client");
                        to_evict.push(target.id);
                    } else {
                        debug!(client_id = %target.id, drops, "queue full, message dropped");
                    }
                }
                Err(SendError::Closed) => {
                    // Target is already tearing itself down; its own loop
                    // handles unregistration.
                    debug!(client_id = %target.id, "skipping closed session");
                }
            }
        }

        for id in to_evict {
            self.registry.unregister(id).await;
        }
        debug!(from = %from, tag = message.tag(), recipients, "broadcast");
    }

    /// Deliver `message` to exactly one session, if it is still present.
    ///
    /// A missing target is a race outcome (it disconnected between
    /// snapshot and send), not an error: log and move on.
    pub async fn unicast(&self, to: ClientId, message: &Message) {
        match self.registry.get(to).await {
            Some(target) => {
                if let Err(e) = target.send(message) {
                    debug!(client_id = %to, error = %e, "unicast not delivered");
                }
            }
            None => debug!(client_id = %to, "unicast target gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const DROP_LIMIT: u64 = 3;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        broadcaster: Broadcaster,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(SessionRegistry::new());
            let broadcaster = Broadcaster::new(registry.clone(), DROP_LIMIT);
            Self {
                registry,
                broadcaster,
            }
        }

        async fn connect(&self, capacity: usize) -> (ClientId, mpsc::Receiver<Arc<String>>) {
            let (tx, rx) = mpsc::channel(capacity);
            let session = self.registry.register(tx).await;
            (session.id, rx)
        }
    }

    fn position(x: f64, y: f64, from: ClientId) -> Message {
        Message::PositionUpdate {
            x,
            y,
            client_id: Some(from),
        }
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let fx = Fixture::new();
        let (a, mut a_rx) = fx.connect(8).await;
        let (_b, mut b_rx) = fx.connect(8).await;
        let (_c, mut c_rx) = fx.connect(8).await;

        fx.broadcaster.broadcast(a, &position(3.0, 4.0, a)).await;

        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_payload_carries_sender_identity() {
        let fx = Fixture::new();
        let (a, _a_rx) = fx.connect(8).await;
        let (_b, mut b_rx) = fx.connect(8).await;

        fx.broadcaster.broadcast(a, &position(1.5, -2.25, a)).await;

        let payload = b_rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["messageType"], "cursorPosition");
        assert_eq!(value["clientId"], u64::from(a.as_u32()));
        assert_eq!(value["x"], 1.5);
        assert_eq!(value["y"], -2.25);
    }

    #[tokio::test]
    async fn broadcast_serializes_once() {
        let fx = Fixture::new();
        let (a, _a_rx) = fx.connect(8).await;
        let (_b, mut b_rx) = fx.connect(8).await;
        let (_c, mut c_rx) = fx.connect(8).await;

        fx.broadcaster.broadcast(a, &position(0.0, 0.0, a)).await;

        let p1 = b_rx.recv().await.unwrap();
        let p2 = c_rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&p1, &p2));
    }

    #[tokio::test]
    async fn broadcast_with_no_peers_is_noop() {
        let fx = Fixture::new();
        let (a, mut a_rx) = fx.connect(8).await;
        fx.broadcaster.broadcast(a, &position(1.0, 1.0, a)).await;
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_peer_does_not_abort_fanout() {
        let fx = Fixture::new();
        let (a, _a_rx) = fx.connect(8).await;
        let (b, b_rx) = fx.connect(8).await;
        let (_c, mut c_rx) = fx.connect(8).await;

        // B's writer side is gone, as after an abrupt disconnect.
        drop(b_rx);
        let _ = b;

        fx.broadcaster.broadcast(a, &position(9.0, 9.0, a)).await;
        assert!(c_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn slow_peer_evicted_after_drop_limit() {
        let fx = Fixture::new();
        let (a, _a_rx) = fx.connect(8).await;
        // Capacity 1 and never drained: every broadcast past the first drops.
        let (slow, _slow_rx) = fx.connect(1).await;
        let (_fast, mut fast_rx) = fx.connect(64).await;

        for _ in 0..=DROP_LIMIT {
            fx.broadcaster.broadcast(a, &position(1.0, 2.0, a)).await;
        }

        assert!(fx.registry.get(slow).await.is_none());
        assert_eq!(fx.registry.len(), 2);
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unicast_reaches_only_target() {
        let fx = Fixture::new();
        let (a, mut a_rx) = fx.connect(8).await;
        let (_b, mut b_rx) = fx.connect(8).await;

        fx.broadcaster
            .unicast(a, &Message::Welcome { client_id: a })
            .await;

        let payload = a_rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["messageType"], "welcome");
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unicast_to_absent_target_is_noop() {
        let fx = Fixture::new();
        fx.broadcaster
            .unicast(
                ClientId::new(404),
                &Message::Welcome {
                    client_id: ClientId::new(404),
                },
            )
            .await;
    }
}
