//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Beacon hub.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `5000`).
    pub port: u16,
    /// Exact-match `Origin` allow-list for the upgrade handshake.
    /// An empty list disables the check (useful for local testing).
    pub allowed_origins: Vec<String>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each session's bounded outbound queue.
    pub send_queue_capacity: usize,
    /// Queue-full drops tolerated before a slow client is force-closed.
    pub max_send_drops: u64,
    /// Interval between server-initiated Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close the connection after this long without a Pong, in seconds.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            allowed_origins: vec!["http://localhost:4000".into()],
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            max_send_drops: 100,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Whether an `Origin` header value passes the allow-list.
    ///
    /// `None` (no header) is rejected whenever a list is configured.
    #[must_use]
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
    }
}
