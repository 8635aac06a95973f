//! Per-client session state.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use beacon_core::{ClientId, Message};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Failure to enqueue a message for a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session has been closed (or its writer task is gone).
    #[error("session closed")]
    Closed,
    /// The session's bounded outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport upgraded, not yet registered.
    Connecting,
    /// Registered and dispatching.
    Active,
    /// Close requested, draining.
    Closing,
    /// Terminal. No further sends.
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// The live server-side representation of one connected client.
///
/// Owns the send side of the bounded outbound queue; the dispatcher's
/// writer task owns the receive side. All sends are non-blocking so a
/// stalled peer can never apply backpressure to whoever is delivering
/// to it.
pub struct ClientSession {
    /// Hub-assigned identity, fixed for the session's lifetime.
    pub id: ClientId,
    state: AtomicU8,
    tx: mpsc::Sender<Arc<String>>,
    cancel: CancellationToken,
    /// When the transport was upgraded.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl ClientSession {
    /// Create a session in the `Connecting` state.
    #[must_use]
    pub fn new(id: ClientId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            state: AtomicU8::new(STATE_CONNECTING),
            tx,
            cancel: CancellationToken::new(),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            STATE_CONNECTING => SessionState::Connecting,
            STATE_ACTIVE => SessionState::Active,
            STATE_CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// Mark registered (`Connecting` → `Active`). Later states win.
    pub(crate) fn activate(&self) {
        let _ = self.state.compare_exchange(
            STATE_CONNECTING,
            STATE_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark draining (`Active` → `Closing`). A close frame has been seen
    /// but cleanup has not run yet.
    pub fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            STATE_ACTIVE,
            STATE_CLOSING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Whether the session is accepting outbound messages.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Connecting | SessionState::Active
        )
    }

    /// Encode and enqueue a message for this client.
    ///
    /// Non-blocking: a full queue counts a drop and returns
    /// [`SendError::QueueFull`]; the message is not retried.
    pub fn send(&self, message: &Message) -> Result<(), SendError> {
        self.send_encoded(Arc::new(message.encode()))
    }

    /// Enqueue an already-encoded payload (used by the broadcaster so one
    /// fan-out serializes exactly once).
    pub fn send_encoded(&self, payload: Arc<String>) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Close the session. Idempotent: the first call transitions to
    /// `Closed` and cancels the session token, which unblocks the
    /// dispatcher's read so its cleanup path runs.
    pub fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.cancel.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Total messages dropped because the queue was full.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a Pong (or any sign of life) from the client.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Take and reset the alive flag. Returns whether the client showed
    /// life since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (ClientSession, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (ClientSession::new(ClientId::new(1), tx), rx)
    }

    #[test]
    fn starts_connecting() {
        let (session, _rx) = make_session();
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.is_open());
    }

    #[test]
    fn activate_transitions_once() {
        let (session, _rx) = make_session();
        session.activate();
        assert_eq!(session.state(), SessionState::Active);
        session.close();
        session.activate();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn send_delivers_encoded_message() {
        let (session, mut rx) = make_session();
        session.send(&Message::Greeting).unwrap();
        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["messageType"], "salutations");
    }

    #[test]
    fn send_after_close_fails_closed() {
        let (session, _rx) = make_session();
        session.close();
        assert_eq!(session.send(&Message::Greeting), Err(SendError::Closed));
    }

    #[test]
    fn close_is_idempotent() {
        let (session, _rx) = make_session();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn send_to_dropped_receiver_fails_closed() {
        let (tx, rx) = mpsc::channel(8);
        let session = ClientSession::new(ClientId::new(2), tx);
        drop(rx);
        assert_eq!(session.send(&Message::Greeting), Err(SendError::Closed));
    }

    #[test]
    fn full_queue_counts_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let session = ClientSession::new(ClientId::new(3), tx);
        session.send(&Message::Greeting).unwrap();
        assert_eq!(session.send(&Message::Greeting), Err(SendError::QueueFull));
        assert_eq!(session.send(&Message::Greeting), Err(SendError::QueueFull));
        assert_eq!(session.drop_count(), 2);
    }

    #[test]
    fn begin_close_refuses_new_sends() {
        let (session, _rx) = make_session();
        session.activate();
        session.begin_close();
        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(session.send(&Message::Greeting), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn closed_future_resolves_on_close() {
        let (session, _rx) = make_session();
        let session = Arc::new(session);
        let waiter = session.clone();
        let handle = tokio::spawn(async move {
            waiter.closed().await;
        });
        session.close();
        handle.await.unwrap();
    }

    #[test]
    fn alive_flag_swaps_on_check() {
        let (session, _rx) = make_session();
        assert!(session.check_alive());
        assert!(!session.check_alive());
        session.mark_alive();
        assert!(session.check_alive());
    }
}
