//! Broadcast network collaborator
//!
//! The network is modeled as a small capability trait so the transport can
//! run against any store-and-forward pub/sub implementation:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  BroadcastNetwork                                        │
//! │  ├── post(NewEnvelope)      seal + submit an envelope    │
//! │  ├── subscribe(Filter)      register a filter            │
//! │  ├── messages(&FilterId)    drain new matching envelopes │
//! │  └── unsubscribe(&FilterId) tear the filter down         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The network owns envelope encryption, proof of work and TTL expiry. It
//! attaches the cryptographic origin of every received envelope as `src`.

pub mod memory;

use std::fmt;

use x25519_dalek::StaticSecret;

use crate::error::BridgeResult;
use crate::keys::SymKey;
use crate::types::{EnvelopeHash, PublicKey, Topic};

pub use memory::{MemoryBus, MemoryNetwork};

/// Encryption requested for an outbound envelope
#[derive(Clone, PartialEq, Eq)]
pub enum EnvelopeKey {
    /// Room key shared by all members of a public chat
    Symmetric(SymKey),
    /// Encrypt to a single recipient
    Asymmetric(PublicKey),
}

impl fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKey::Symmetric(_) => write!(f, "Symmetric([REDACTED])"),
            EnvelopeKey::Asymmetric(key) => {
                write!(f, "Asymmetric({})", hex::encode(&key.as_bytes()[..8]))
            }
        }
    }
}

/// Envelope-construction request
#[derive(Debug, Clone)]
pub struct NewEnvelope {
    pub topic: Topic,
    pub payload: Vec<u8>,
    pub key: EnvelopeKey,
    pub ttl_secs: u32,
    pub pow_target: f64,
    pub pow_time_secs: u32,
}

/// Key a filter uses to open matching envelopes
#[derive(Clone)]
pub enum FilterKey {
    /// Open envelopes sealed with this room key
    Symmetric(SymKey),
    /// Open envelopes sealed to the owner of this secret
    Asymmetric(StaticSecret),
}

impl fmt::Debug for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKey::Symmetric(_) => write!(f, "Symmetric([REDACTED])"),
            FilterKey::Asymmetric(_) => write!(f, "Asymmetric([REDACTED])"),
        }
    }
}

/// Criteria selecting which envelopes a subscription receives
#[derive(Debug, Clone)]
pub struct Filter {
    pub topics: Vec<Topic>,
    pub key: FilterKey,
    /// Only accept envelopes originating from this key
    pub source: Option<PublicKey>,
}

impl Filter {
    /// True if the envelope's topic and origin pass this filter.
    pub fn matches(&self, topic: &Topic, src: Option<&PublicKey>) -> bool {
        if !self.topics.contains(topic) {
            return false;
        }
        match (&self.source, src) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
        }
    }
}

/// Handle to a registered filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterId(pub String);

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decrypted envelope matching a filter
#[derive(Debug, Clone)]
pub struct ReceivedEnvelope {
    pub hash: EnvelopeHash,
    pub topic: Topic,
    /// Cryptographic origin, `None` for unsigned envelopes
    pub src: Option<PublicKey>,
    pub payload: Vec<u8>,
    /// Unix seconds at which the envelope was posted
    pub sent_at: i64,
    pub ttl_secs: u32,
}

/// Store-and-forward broadcast network
pub trait BroadcastNetwork: Send + Sync {
    /// Seal and submit an envelope.
    fn post(&self, envelope: NewEnvelope) -> BridgeResult<EnvelopeHash>;

    /// Register a filter; matching envelopes accumulate until polled.
    fn subscribe(&self, filter: Filter) -> BridgeResult<FilterId>;

    /// Drain envelopes received by the filter since the previous call.
    fn messages(&self, id: &FilterId) -> BridgeResult<Vec<ReceivedEnvelope>>;

    /// Remove a filter.
    fn unsubscribe(&self, id: &FilterId) -> BridgeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(source: Option<PublicKey>) -> Filter {
        Filter {
            topics: vec![Topic([1, 2, 3, 4])],
            key: FilterKey::Symmetric([0u8; 32]),
            source,
        }
    }

    #[test]
    fn test_filter_matches_topic() {
        let f = filter(None);
        assert!(f.matches(&Topic([1, 2, 3, 4]), None));
        assert!(!f.matches(&Topic([4, 3, 2, 1]), None));
    }

    #[test]
    fn test_filter_matches_source() {
        let alice = PublicKey::from([1u8; 32]);
        let bob = PublicKey::from([2u8; 32]);
        let f = filter(Some(alice));
        let topic = Topic([1, 2, 3, 4]);

        assert!(f.matches(&topic, Some(&alice)));
        assert!(!f.matches(&topic, Some(&bob)));
        assert!(!f.matches(&topic, None));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let key = EnvelopeKey::Symmetric([7u8; 32]);
        assert_eq!(format!("{:?}", key), "Symmetric([REDACTED])");
    }
}
