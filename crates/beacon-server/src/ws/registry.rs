//! Process-wide session registry and identity assignment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use beacon_core::ClientId;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::debug;

use super::session::ClientSession;

/// Concurrency-safe map of identity → live session.
///
/// Identities come from a monotonic counter, so two registrations can
/// never collide and an identity is never reused for the life of the
/// process. Mutation takes the write lock; broadcast reads copy a
/// snapshot under the read lock so slow sends never hold the map.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ClientId, Arc<ClientSession>>>,
    next_id: AtomicU32,
    /// Tracked separately so `/health` can read it without locking.
    active: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry. The first assigned identity is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            active: AtomicUsize::new(0),
        }
    }

    /// Mint a fresh identity, build the session around `tx`, and insert
    /// it as `Active`.
    pub async fn register(&self, tx: mpsc::Sender<Arc<String>>) -> Arc<ClientSession> {
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(ClientSession::new(id, tx));
        session.activate();
        let mut sessions = self.sessions.write().await;
        if sessions.insert(id, session.clone()).is_none() {
            let _ = self.active.fetch_add(1, Ordering::Relaxed);
        }
        debug!(client_id = %id, "session registered");
        session
    }

    /// Remove and close a session. A no-op when the identity is absent.
    pub async fn unregister(&self, id: ClientId) {
        let removed = self.sessions.write().await.remove(&id);
        if let Some(session) = removed {
            let _ = self.active.fetch_sub(1, Ordering::Relaxed);
            session.close();
            debug!(client_id = %id, "session unregistered");
        }
    }

    /// Look up a session by identity.
    pub async fn get(&self, id: ClientId) -> Option<Arc<ClientSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Point-in-time copy of all live sessions, safe to iterate while
    /// the registry keeps mutating.
    pub async fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Whether no sessions are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
