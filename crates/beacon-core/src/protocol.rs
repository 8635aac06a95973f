//! Wire protocol codec.
//!
//! Messages travel as flat JSON objects of the shape
//! `{"messageType": string, "x"?: f64, "y"?: f64, "clientId"?: u32}`.
//! Decoding validates the fields a recognized tag requires; an
//! unrecognized tag decodes into [`Message::Unknown`] so routing can log
//! and ignore it without tearing the connection down.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::DecodeError;
use crate::ids::ClientId;

/// Wire tag for [`Message::Greeting`].
pub const TAG_GREETING: &str = "salutations";
/// Wire tag for [`Message::PositionUpdate`].
pub const TAG_POSITION: &str = "cursorPosition";
/// Wire tag for [`Message::Welcome`].
pub const TAG_WELCOME: &str = "welcome";
/// Wire tag for [`Message::Acknowledge`].
pub const TAG_ACK: &str = "ack";

/// Flat wire representation. All payload fields are optional at the JSON
/// level; which ones are required depends on `message_type`.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "messageType")]
    message_type: String,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(rename = "clientId", default)]
    client_id: Option<u32>,
}

/// A decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client announcing itself (`"salutations"`). No payload.
    Greeting,
    /// A cursor position report (`"cursorPosition"`).
    PositionUpdate {
        /// Cursor x coordinate, IEEE-754 double, passed through bit-exact.
        x: f64,
        /// Cursor y coordinate.
        y: f64,
        /// Sender identity. Absent on the inbound leg; the dispatcher
        /// stamps it before rebroadcast. Never trusted from the client.
        client_id: Option<ClientId>,
    },
    /// Server reply carrying the assigned identity (`"welcome"`).
    Welcome {
        /// The identity assigned to the receiving client.
        client_id: ClientId,
    },
    /// Client acknowledgment (`"ack"`).
    Acknowledge {
        /// The identity the client is acknowledging as.
        client_id: ClientId,
    },
    /// Any unrecognized `messageType`. Decoding succeeds; routing logs
    /// and ignores.
    Unknown {
        /// The raw tag string as received.
        tag: String,
    },
}

impl Message {
    /// Decode a wire payload.
    ///
    /// Structural problems (not a JSON object, `messageType` missing or
    /// not a string, required fields for a recognized tag missing or
    /// wrong-typed) yield a [`DecodeError`]. Unknown tags do not.
    pub fn decode(input: &str) -> Result<Self, DecodeError> {
        let wire: WireMessage =
            serde_json::from_str(input).map_err(|e| DecodeError::new(e.to_string()))?;

        match wire.message_type.as_str() {
            TAG_GREETING => Ok(Self::Greeting),
            TAG_POSITION => {
                let x = wire
                    .x
                    .ok_or_else(|| DecodeError::new("cursorPosition missing field `x`"))?;
                let y = wire
                    .y
                    .ok_or_else(|| DecodeError::new("cursorPosition missing field `y`"))?;
                Ok(Self::PositionUpdate {
                    x,
                    y,
                    client_id: wire.client_id.map(ClientId::new),
                })
            }
            TAG_WELCOME => {
                let id = wire
                    .client_id
                    .ok_or_else(|| DecodeError::new("welcome missing field `clientId`"))?;
                Ok(Self::Welcome {
                    client_id: ClientId::new(id),
                })
            }
            TAG_ACK => {
                let id = wire
                    .client_id
                    .ok_or_else(|| DecodeError::new("ack missing field `clientId`"))?;
                Ok(Self::Acknowledge {
                    client_id: ClientId::new(id),
                })
            }
            _ => Ok(Self::Unknown {
                tag: wire.message_type,
            }),
        }
    }

    /// Encode to the wire shape. Total over all variants; fields without a
    /// value are omitted rather than sent as `null`.
    #[must_use]
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Greeting => json!({ "messageType": TAG_GREETING }),
            Self::PositionUpdate { x, y, client_id } => match client_id {
                Some(id) => json!({
                    "messageType": TAG_POSITION,
                    "x": x,
                    "y": y,
                    "clientId": id.as_u32(),
                }),
                None => json!({ "messageType": TAG_POSITION, "x": x, "y": y }),
            },
            Self::Welcome { client_id } => json!({
                "messageType": TAG_WELCOME,
                "clientId": client_id.as_u32(),
            }),
            Self::Acknowledge { client_id } => json!({
                "messageType": TAG_ACK,
                "clientId": client_id.as_u32(),
            }),
            Self::Unknown { tag } => json!({ "messageType": tag }),
        };
        value.to_string()
    }

    /// The wire tag this message carries.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Greeting => TAG_GREETING,
            Self::PositionUpdate { .. } => TAG_POSITION,
            Self::Welcome { .. } => TAG_WELCOME,
            Self::Acknowledge { .. } => TAG_ACK,
            Self::Unknown { tag } => tag,
        }
    }
}
