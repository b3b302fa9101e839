//! Chat wire messages.
//!
//! The chat server sends `{"message": "...", "username": "..."}` to every
//! room member and accepts `{"message": "..."}` from the client; the
//! sender is identified server-side from the channel's credential.

use serde::{Deserialize, Serialize};

/// A message delivered to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Display name of the member who sent the message.
    #[serde(rename = "username")]
    pub sender_name: String,
    /// Message text (already translated for this member, if applicable).
    #[serde(rename = "message")]
    pub body: String,
}

/// A message to publish to the current room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "message")]
    pub body: String,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Parse an inbound text frame.
///
/// Returns `Err` for malformed JSON or missing fields.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize an outbound message into a text frame.
pub fn encode_outbound(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
