//! Application message types
//!
//! [`ChatMessage`] is the body the application appends to the sync engine;
//! [`Message`] is what a subscriber receives once the transport has decoded
//! a body out of an inbound packet.

use serde::{Deserialize, Serialize, Serializer};

use crate::types::{MessageId, PublicKey};

/// Content type of plain text messages
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Kind of conversation a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Message in a public room
    PublicGroup,
    /// Private one-to-one message
    OneToOne,
}

/// An application message as carried inside a sync record body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub content_type: String,
    pub message_type: MessageType,
    /// Logical clock used to order delivery
    pub clock: i64,
    /// Unix timestamp in milliseconds when the message was created
    pub timestamp: i64,
}

impl ChatMessage {
    /// Create a plain text message for a public room.
    pub fn public(text: impl Into<String>, clock: i64) -> Self {
        Self::text(text, MessageType::PublicGroup, clock)
    }

    /// Create a plain text one-to-one message.
    pub fn private(text: impl Into<String>, clock: i64) -> Self {
        Self::text(text, MessageType::OneToOne, clock)
    }

    fn text(text: impl Into<String>, message_type: MessageType, clock: i64) -> Self {
        Self {
            text: text.into(),
            content_type: CONTENT_TYPE_TEXT.to_string(),
            message_type,
            clock,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Encode the message into a versioned body
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        WireChatMessage::V1(self.clone()).encode()
    }

    /// Decode a versioned body
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        WireChatMessage::decode(data).map(WireChatMessage::into_inner)
    }
}

/// Versioned wrapper for message bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireChatMessage {
    /// Body format version 1
    V1(ChatMessage),
}

impl WireChatMessage {
    /// Encode wire message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode wire message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Unwrap the inner ChatMessage
    pub fn into_inner(self) -> ChatMessage {
        match self {
            WireChatMessage::V1(msg) => msg,
        }
    }

    /// Get the body format version
    pub fn version(&self) -> u8 {
        match self {
            WireChatMessage::V1(_) => 1,
        }
    }
}

/// A decoded message delivered to a subscriber
///
/// The sender key is attached by the transport from the envelope's
/// cryptographic origin; it is never read from the body and is left out of
/// the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "message")]
    pub decoded: ChatMessage,
    #[serde(skip)]
    pub sig_pub_key: Option<PublicKey>,
    #[serde(serialize_with = "serialize_id")]
    pub id: MessageId,
}

impl Message {
    /// Logical clock of the decoded body
    pub fn clock(&self) -> i64 {
        self.decoded.clock
    }
}

fn serialize_id<S: Serializer>(id: &MessageId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_hex())
}
