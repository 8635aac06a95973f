//! Branded identity newtype.
//!
//! The hub assigns every connected client a `ClientId` for the lifetime of
//! its session. The newtype keeps identities from being confused with the
//! raw coordinates and counters that also travel as plain integers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hub-assigned identity of a connected client.
///
/// Opaque to clients: the value is minted by the session registry (a
/// process-wide monotonic counter, so an identity is never reused for the
/// lifetime of the process) and is never accepted from a client payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u32);

impl ClientId {
    /// Wrap a raw identity value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw wire representation.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for ClientId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<ClientId> for u32 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}
