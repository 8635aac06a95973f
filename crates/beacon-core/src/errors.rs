//! Error types for the wire codec.

use thiserror::Error;

/// A payload that could not be decoded into a [`crate::Message`].
///
/// Raised only for structural problems: input that is not a JSON object,
/// or a recognized `messageType` missing one of its required fields. An
/// unrecognized `messageType` is *not* a decode error — it decodes into
/// `Message::Unknown` and is a routing concern.
#[derive(Debug, Error)]
#[error("malformed message: {reason}")]
pub struct DecodeError {
    /// What was wrong with the payload.
    pub reason: String,
}

impl DecodeError {
    /// Build a decode error from any displayable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = DecodeError::new("missing field `x`");
        assert_eq!(err.to_string(), "malformed message: missing field `x`");
    }
}
