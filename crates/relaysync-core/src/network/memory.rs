//! In-process broadcast network
//!
//! A [`MemoryBus`] is the shared envelope pool; every node talks to it
//! through its own [`MemoryNetwork`] handle, which carries the node's
//! identity and is what the bus records as the envelope origin.
//!
//! Envelopes are sealed for real with ChaCha20-Poly1305:
//!
//! ```text
//! Symmetric:  key = room key
//! Asymmetric: key = HKDF-SHA256(X25519(ephemeral, recipient),
//!                               salt = ephemeral_pub || recipient_pub)
//! ```
//!
//! Envelopes expire after their TTL and each filter sees an envelope at most
//! once. Proof-of-work parameters are recorded but not computed.

use std::collections::HashMap;
use std::sync::Arc;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, trace};
use x25519_dalek::StaticSecret;

use super::{
    BroadcastNetwork, EnvelopeKey, Filter, FilterId, FilterKey, NewEnvelope, ReceivedEnvelope,
};
use crate::error::{BridgeError, BridgeResult};
use crate::keys::SymKey;
use crate::types::{EnvelopeHash, PublicKey, Topic};

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
const NONCE_SIZE: usize = 12;

/// HKDF info string for asymmetric envelope keys.
const ENVELOPE_KEY_INFO: &[u8] = b"relaysync-envelope-key-v1";

/// Default upper bound on an envelope payload
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Ciphertext of an envelope as stored on the bus
#[derive(Clone)]
enum Sealed {
    Symmetric {
        nonce: [u8; NONCE_SIZE],
        ciphertext: Vec<u8>,
    },
    Asymmetric {
        ephemeral: PublicKey,
        recipient: PublicKey,
        nonce: [u8; NONCE_SIZE],
        ciphertext: Vec<u8>,
    },
}

#[derive(Clone)]
struct StoredEnvelope {
    seq: u64,
    hash: EnvelopeHash,
    topic: Topic,
    src: Option<PublicKey>,
    sealed: Sealed,
    sent_at: i64,
    ttl_secs: u32,
    #[allow(dead_code)]
    pow_target: f64,
}

impl StoredEnvelope {
    fn is_expired(&self, now: i64) -> bool {
        self.sent_at + i64::from(self.ttl_secs) <= now
    }
}

struct FilterState {
    filter: Filter,
    /// Highest envelope sequence number already examined
    cursor: u64,
}

#[derive(Default)]
struct BusState {
    envelopes: Vec<StoredEnvelope>,
    filters: HashMap<FilterId, FilterState>,
    next_seq: u64,
    next_filter: u64,
}

/// Shared envelope pool for in-process nodes
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
    max_payload: usize,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a bus rejecting payloads larger than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            max_payload,
        }
    }

    /// Attach a node with the given identity.
    pub fn node(&self, identity: &StaticSecret) -> MemoryNetwork {
        MemoryNetwork {
            bus: self.clone(),
            origin: Some(PublicKey::from(identity)),
        }
    }

    /// Attach a node whose envelopes carry no origin.
    pub fn anonymous_node(&self) -> MemoryNetwork {
        MemoryNetwork {
            bus: self.clone(),
            origin: None,
        }
    }

    /// Number of live (unexpired) envelopes
    pub fn envelope_count(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        self.state
            .lock()
            .envelopes
            .iter()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Number of registered filters
    pub fn filter_count(&self) -> usize {
        self.state.lock().filters.len()
    }

    /// Drop every registered filter, as a restarting node would.
    pub fn clear_filters(&self) {
        self.state.lock().filters.clear();
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A node's handle onto a [`MemoryBus`]
#[derive(Clone)]
pub struct MemoryNetwork {
    bus: MemoryBus,
    origin: Option<PublicKey>,
}

impl MemoryNetwork {
    /// Public key recorded as the origin of this node's envelopes
    pub fn origin(&self) -> Option<PublicKey> {
        self.origin
    }

    /// Submit raw bytes without going through the transport.
    pub fn post_raw(
        &self,
        topic: Topic,
        key: EnvelopeKey,
        payload: Vec<u8>,
    ) -> BridgeResult<EnvelopeHash> {
        self.post(NewEnvelope {
            topic,
            payload,
            key,
            ttl_secs: 60,
            pow_target: 0.0,
            pow_time_secs: 0,
        })
    }
}

impl BroadcastNetwork for MemoryNetwork {
    fn post(&self, envelope: NewEnvelope) -> BridgeResult<EnvelopeHash> {
        if envelope.payload.len() > self.bus.max_payload {
            return Err(BridgeError::Transport(format!(
                "payload of {} bytes exceeds limit of {}",
                envelope.payload.len(),
                self.bus.max_payload
            )));
        }

        let sealed = seal(&envelope.key, &envelope.payload)?;
        let now = chrono::Utc::now().timestamp();

        let mut state = self.bus.state.lock();
        state.envelopes.retain(|e| !e.is_expired(now));
        state.next_seq += 1;
        let seq = state.next_seq;
        let hash = envelope_hash(seq, &envelope.topic, &sealed);

        debug!(
            topic = %envelope.topic,
            %hash,
            len = envelope.payload.len(),
            ttl = envelope.ttl_secs,
            pow_target = envelope.pow_target,
            "Envelope posted"
        );

        state.envelopes.push(StoredEnvelope {
            seq,
            hash,
            topic: envelope.topic,
            src: self.origin,
            sealed,
            sent_at: now,
            ttl_secs: envelope.ttl_secs,
            pow_target: envelope.pow_target,
        });

        Ok(hash)
    }

    fn subscribe(&self, filter: Filter) -> BridgeResult<FilterId> {
        if filter.topics.is_empty() {
            return Err(BridgeError::Transport("filter has no topics".to_string()));
        }

        let mut state = self.bus.state.lock();
        state.next_filter += 1;
        let id = FilterId(format!("filter-{}", state.next_filter));
        // Envelopes already on the bus are still delivered
        state
            .filters
            .insert(id.clone(), FilterState { filter, cursor: 0 });
        debug!(filter = %id, "Filter registered");
        Ok(id)
    }

    fn messages(&self, id: &FilterId) -> BridgeResult<Vec<ReceivedEnvelope>> {
        let now = chrono::Utc::now().timestamp();
        let mut guard = self.bus.state.lock();
        let state = &mut *guard;

        let filter_state = state
            .filters
            .get_mut(id)
            .ok_or_else(|| BridgeError::Transport(format!("unknown filter {}", id)))?;

        let start = filter_state.cursor;
        let mut received = Vec::new();
        for envelope in state.envelopes.iter().filter(|e| e.seq > start) {
            filter_state.cursor = envelope.seq;

            if envelope.is_expired(now)
                || !filter_state
                    .filter
                    .matches(&envelope.topic, envelope.src.as_ref())
            {
                continue;
            }

            match open(&filter_state.filter.key, &envelope.sealed) {
                Some(payload) => received.push(ReceivedEnvelope {
                    hash: envelope.hash,
                    topic: envelope.topic,
                    src: envelope.src,
                    payload,
                    sent_at: envelope.sent_at,
                    ttl_secs: envelope.ttl_secs,
                }),
                None => trace!(hash = %envelope.hash, "Envelope not addressed to filter"),
            }
        }

        Ok(received)
    }

    fn unsubscribe(&self, id: &FilterId) -> BridgeResult<()> {
        match self.bus.state.lock().filters.remove(id) {
            Some(_) => {
                debug!(filter = %id, "Filter removed");
                Ok(())
            }
            None => Err(BridgeError::Transport(format!("unknown filter {}", id))),
        }
    }
}

fn seal(key: &EnvelopeKey, payload: &[u8]) -> BridgeResult<Sealed> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    match key {
        EnvelopeKey::Symmetric(room_key) => Ok(Sealed::Symmetric {
            nonce,
            ciphertext: encrypt(room_key, &nonce, payload)?,
        }),
        EnvelopeKey::Asymmetric(recipient) => {
            let mut seed = [0u8; 32];
            rand::rng().fill_bytes(&mut seed);
            let ephemeral_secret = StaticSecret::from(seed);
            let ephemeral = PublicKey::from(&ephemeral_secret);

            let shared = ephemeral_secret.diffie_hellman(recipient);
            let key = derive_envelope_key(shared.as_bytes(), &ephemeral, recipient);

            Ok(Sealed::Asymmetric {
                ephemeral,
                recipient: *recipient,
                nonce,
                ciphertext: encrypt(&key, &nonce, payload)?,
            })
        }
    }
}

fn open(key: &FilterKey, sealed: &Sealed) -> Option<Vec<u8>> {
    match (key, sealed) {
        (FilterKey::Symmetric(room_key), Sealed::Symmetric { nonce, ciphertext }) => {
            decrypt(room_key, nonce, ciphertext)
        }
        (
            FilterKey::Asymmetric(secret),
            Sealed::Asymmetric {
                ephemeral,
                recipient,
                nonce,
                ciphertext,
            },
        ) => {
            let own = PublicKey::from(secret);
            if own != *recipient {
                return None;
            }
            let shared = secret.diffie_hellman(ephemeral);
            let key = derive_envelope_key(shared.as_bytes(), ephemeral, &own);
            decrypt(&key, nonce, ciphertext)
        }
        _ => None,
    }
}

fn derive_envelope_key(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> SymKey {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    // 32 bytes is always a valid HKDF-SHA256 output length
    let _ = hk.expand(ENVELOPE_KEY_INFO, &mut key);
    key
}

fn encrypt(key: &SymKey, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> BridgeResult<Vec<u8>> {
    ChaCha20Poly1305::new(key.into())
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| BridgeError::Crypto(format!("Encryption failed: {}", e)))
}

fn decrypt(key: &SymKey, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Option<Vec<u8>> {
    ChaCha20Poly1305::new(key.into())
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .ok()
}

fn envelope_hash(seq: u64, topic: &Topic, sealed: &Sealed) -> EnvelopeHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seq.to_le_bytes());
    hasher.update(topic.as_bytes());
    match sealed {
        Sealed::Symmetric { nonce, ciphertext } => {
            hasher.update(nonce);
            hasher.update(ciphertext);
        }
        Sealed::Asymmetric {
            ephemeral,
            nonce,
            ciphertext,
            ..
        } => {
            hasher.update(ephemeral.as_bytes());
            hasher.update(nonce);
            hasher.update(ciphertext);
        }
    }
    EnvelopeHash(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> StaticSecret {
        StaticSecret::from([byte; 32])
    }

    fn room_filter(topic: Topic, key: SymKey) -> Filter {
        Filter {
            topics: vec![topic],
            key: FilterKey::Symmetric(key),
            source: None,
        }
    }

    #[test]
    fn test_symmetric_envelope_roundtrip() {
        let bus = MemoryBus::new();
        let alice = bus.node(&secret(1));
        let bob = bus.node(&secret(2));
        let topic = Topic([1, 1, 1, 1]);

        let filter = bob.subscribe(room_filter(topic, [9u8; 32])).unwrap();
        alice
            .post_raw(topic, EnvelopeKey::Symmetric([9u8; 32]), b"hello".to_vec())
            .unwrap();

        let received = bob.messages(&filter).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, b"hello");
        assert_eq!(received[0].src, alice.origin());
    }

    #[test]
    fn test_each_envelope_delivered_once() {
        let bus = MemoryBus::new();
        let node = bus.node(&secret(1));
        let topic = Topic([1, 1, 1, 1]);

        let filter = node.subscribe(room_filter(topic, [9u8; 32])).unwrap();
        node.post_raw(topic, EnvelopeKey::Symmetric([9u8; 32]), vec![1])
            .unwrap();

        assert_eq!(node.messages(&filter).unwrap().len(), 1);
        assert!(node.messages(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_cursor_advances_across_polls() {
        let bus = MemoryBus::new();
        let node = bus.node(&secret(1));
        let topic = Topic([1, 1, 1, 1]);
        let key = EnvelopeKey::Symmetric([9u8; 32]);

        let filter = node.subscribe(room_filter(topic, [9u8; 32])).unwrap();
        node.post_raw(topic, key.clone(), vec![1]).unwrap();
        node.post_raw(Topic([2, 2, 2, 2]), key.clone(), vec![2]).unwrap();
        node.post_raw(topic, key.clone(), vec![3]).unwrap();

        let first: Vec<_> = node
            .messages(&filter)
            .unwrap()
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(first, vec![vec![1], vec![3]]);

        node.post_raw(topic, key, vec![4]).unwrap();
        let second = node.messages(&filter).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].payload, vec![4]);
    }

    #[test]
    fn test_wrong_room_key_is_filtered_out() {
        let bus = MemoryBus::new();
        let node = bus.node(&secret(1));
        let topic = Topic([1, 1, 1, 1]);

        let filter = node.subscribe(room_filter(topic, [9u8; 32])).unwrap();
        node.post_raw(topic, EnvelopeKey::Symmetric([8u8; 32]), vec![1])
            .unwrap();

        assert!(node.messages(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_asymmetric_envelope_only_opens_for_recipient() {
        let bus = MemoryBus::new();
        let alice = bus.node(&secret(1));
        let bob_secret = secret(2);
        let carol_secret = secret(3);
        let bob = bus.node(&bob_secret);
        let carol = bus.node(&carol_secret);
        let topic = Topic([2, 2, 2, 2]);

        let private_filter = |s: &StaticSecret| Filter {
            topics: vec![topic],
            key: FilterKey::Asymmetric(s.clone()),
            source: None,
        };
        let bob_filter = bob.subscribe(private_filter(&bob_secret)).unwrap();
        let carol_filter = carol.subscribe(private_filter(&carol_secret)).unwrap();

        alice
            .post_raw(
                topic,
                EnvelopeKey::Asymmetric(PublicKey::from(&bob_secret)),
                b"secret".to_vec(),
            )
            .unwrap();

        let received = bob.messages(&bob_filter).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, b"secret");
        assert!(carol.messages(&carol_filter).unwrap().is_empty());
    }

    #[test]
    fn test_expired_envelopes_are_not_delivered() {
        let bus = MemoryBus::new();
        let node = bus.node(&secret(1));
        let topic = Topic([1, 1, 1, 1]);

        let filter = node.subscribe(room_filter(topic, [9u8; 32])).unwrap();
        node.post(NewEnvelope {
            topic,
            payload: vec![1],
            key: EnvelopeKey::Symmetric([9u8; 32]),
            ttl_secs: 0,
            pow_target: 0.0,
            pow_time_secs: 0,
        })
        .unwrap();

        assert!(node.messages(&filter).unwrap().is_empty());
        assert_eq!(bus.envelope_count(), 0);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let bus = MemoryBus::with_max_payload(4);
        let node = bus.node(&secret(1));
        let result = node.post_raw(Topic([0; 4]), EnvelopeKey::Symmetric([0u8; 32]), vec![0; 5]);
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }

    #[test]
    fn test_unknown_filter_errors() {
        let bus = MemoryBus::new();
        let node = bus.node(&secret(1));
        let filter = node
            .subscribe(room_filter(Topic([1, 1, 1, 1]), [9u8; 32]))
            .unwrap();

        bus.clear_filters();
        assert!(node.messages(&filter).is_err());
        assert!(node.unsubscribe(&filter).is_err());
    }

    #[test]
    fn test_anonymous_node_has_no_origin() {
        let bus = MemoryBus::new();
        let anon = bus.anonymous_node();
        let topic = Topic([1, 1, 1, 1]);
        let filter = anon.subscribe(room_filter(topic, [9u8; 32])).unwrap();

        anon.post_raw(topic, EnvelopeKey::Symmetric([9u8; 32]), vec![1])
            .unwrap();
        assert_eq!(anon.messages(&filter).unwrap()[0].src, None);
    }
}
