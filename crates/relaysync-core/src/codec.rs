//! Topic / group codec
//!
//! Maps between the network's 4-byte [`Topic`] and the sync engine's 32-byte
//! [`GroupId`], and from human-readable chat names to topics.
//!
//! ## Truncation
//!
//! ```text
//! group_for_topic:  topic[0..4] ++ [0u8; 28]   -> GroupId
//! topic_for_group:  group[0..4]                -> Topic
//! ```
//!
//! `topic_for_group` keeps only the leading [`TOPIC_LENGTH`] bytes of a
//! group. Groups that differ only past that point collide on the wire and
//! share one broadcast channel. Consumers must tolerate envelopes for such
//! sibling groups; `group_for_topic` always yields the zero-extended group.

use crate::error::{BridgeError, BridgeResult};
use crate::types::{GroupId, PublicKey, Topic, GROUP_ID_LENGTH, TOPIC_LENGTH};

/// Domain separation context for chat-name topics.
const CHAT_TOPIC_CONTEXT: &str = "relaysync-chat-topic-v1";

/// Domain separation context for one-to-one conversation topics.
const PRIVATE_TOPIC_CONTEXT: &str = "relaysync-private-topic-v1";

/// Derive the topic for a public chat name.
///
/// One-way BLAKE3 hash of the name, truncated to [`TOPIC_LENGTH`] bytes.
/// Fails only on an empty name.
pub fn topic_for_chat_name(name: &str) -> BridgeResult<Topic> {
    if name.is_empty() {
        return Err(BridgeError::InvalidTopic("chat name is empty".to_string()));
    }

    Ok(truncate(blake3::derive_key(CHAT_TOPIC_CONTEXT, name.as_bytes())))
}

/// Topic of the one-to-one conversation between `a` and `b`.
///
/// Symmetric in its arguments, so both parties derive the same topic and
/// the same group. Every pair of keys gets its own group, which keeps the
/// sync engine from replicating one conversation to another contact.
pub fn private_topic(a: &PublicKey, b: &PublicKey) -> Topic {
    let (low, high) = if a.as_bytes() <= b.as_bytes() {
        (a, b)
    } else {
        (b, a)
    };

    let mut material = [0u8; 64];
    material[..32].copy_from_slice(low.as_bytes());
    material[32..].copy_from_slice(high.as_bytes());
    truncate(blake3::derive_key(PRIVATE_TOPIC_CONTEXT, &material))
}

fn truncate(hash: [u8; 32]) -> Topic {
    let mut topic = [0u8; TOPIC_LENGTH];
    topic.copy_from_slice(&hash[..TOPIC_LENGTH]);
    Topic(topic)
}

/// Truncate a group to its on-wire topic (leading 4 bytes).
pub fn topic_for_group(group: &GroupId) -> Topic {
    let mut topic = [0u8; TOPIC_LENGTH];
    topic.copy_from_slice(&group.0[..TOPIC_LENGTH]);
    Topic(topic)
}

/// Zero-extend a topic into a group.
pub fn group_for_topic(topic: &Topic) -> GroupId {
    let mut group = [0u8; GROUP_ID_LENGTH];
    group[..TOPIC_LENGTH].copy_from_slice(&topic.0);
    GroupId(group)
}
