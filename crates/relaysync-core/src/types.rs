//! Core types for Relay Sync
//!
//! Addressing units of both sides of the bridge: the broadcast network's
//! [`Topic`] and the sync engine's [`GroupId`] / [`PeerId`], plus the sync
//! engine's [`Packet`] and [`Payload`] model.

use std::fmt;

use serde::{Deserialize, Serialize};
pub use x25519_dalek::PublicKey;

/// Width of a network topic in bytes
pub const TOPIC_LENGTH: usize = 4;

/// Width of a sync engine group identifier in bytes
pub const GROUP_ID_LENGTH: usize = 32;

/// Fixed-width identifier of a broadcast channel on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(pub [u8; TOPIC_LENGTH]);

impl Topic {
    /// Create a Topic from raw bytes
    pub fn from_bytes(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the Topic
    pub fn as_bytes(&self) -> &[u8; TOPIC_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// The sync engine's addressing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub [u8; GROUP_ID_LENGTH]);

impl GroupId {
    /// Create a GroupId from raw bytes
    pub fn from_bytes(bytes: [u8; GROUP_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the GroupId
    pub fn as_bytes(&self) -> &[u8; GROUP_ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group_{}", hex::encode(&self.0[..8]))
    }
}

/// Identifies a counterparty within a group
///
/// Holds the raw X25519 public key bytes, so the recipient key of an
/// outbound envelope can be recovered from the peer id alone. Computed on
/// demand; membership is persisted by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Derive the peer id for a public key
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(*key.as_bytes())
    }

    /// Recover the public key this peer id was derived from
    pub fn to_public_key(&self) -> PublicKey {
        PublicKey::from(self.0)
    }

    /// Get the raw bytes of the PeerId
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<&PublicKey> for PeerId {
    fn from(key: &PublicKey) -> Self {
        Self::from_public_key(key)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer_{}", hex::encode(&self.0[..8]))
    }
}

/// Content fingerprint of a message (see [`compute_message_id`](crate::compute_message_id))
///
/// Also used by the sync engine as its packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub [u8; 32]);

impl MessageId {
    /// Get the raw bytes of the MessageId
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Hash identifying an envelope on the broadcast network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeHash(pub [u8; 32]);

impl fmt::Display for EnvelopeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A single application message carried inside a [`Payload`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Group the message was appended to
    pub group_id: GroupId,
    /// Unix timestamp (seconds) assigned by the sync engine
    pub timestamp: i64,
    /// Encoded application message
    pub body: Vec<u8>,
}

/// Opaque sync-engine container: application messages plus control metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Messages being delivered
    pub messages: Vec<SyncRecord>,
    /// Acknowledgements for messages the sender received
    pub acks: Vec<MessageId>,
    /// Messages the sender offers
    pub offers: Vec<MessageId>,
    /// Messages the sender requests
    pub requests: Vec<MessageId>,
}

impl Payload {
    /// Encode payload to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode payload from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// True if the payload carries neither messages nor control metadata
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.acks.is_empty()
            && self.offers.is_empty()
            && self.requests.is_empty()
    }
}

/// The sync engine's unit of exchange
///
/// Inbound packets always carry the sender taken from the envelope's
/// cryptographic origin, never from the payload body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub group: GroupId,
    pub sender: PeerId,
    pub payload: Payload,
}
