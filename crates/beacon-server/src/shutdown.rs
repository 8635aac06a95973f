//! Graceful shutdown coordination.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// How long to wait for session tasks to drain before giving up.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans a single shutdown signal out to every server task.
///
/// Each session loop selects on a clone of this token; cancelling it
/// unblocks their reads so cleanup runs before the process exits.
/// Session futures are registered with a [`TaskTracker`] so the drain
/// can wait for those cleanup tails.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token observers can wait on.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Safe to call more than once.
    pub fn begin(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for every tracked task to finish, up to
    /// `timeout` (default ten seconds). Tasks still running afterwards
    /// are left to die with the process.
    pub async fn drain(&self, tracker: &TaskTracker, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.begin();
        tracker.close();
        info!(tasks = tracker.len(), "draining session tasks");
        if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
            warn!(?timeout, "drain timed out with tasks still running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
