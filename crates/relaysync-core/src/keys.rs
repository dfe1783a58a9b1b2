//! Key management for outbound and inbound envelopes
//!
//! Picks the encryption mode of an envelope from its topic:
//!
//! - **Public rooms**: symmetric key derived from the chat name with
//!   HKDF-SHA256, so everyone who knows the room name can read it.
//! - **Private chats**: one topic per pair of keys, always encrypted to the
//!   other party's X25519 public key and read with our own static secret.
//!
//! Room keys are cached per chat name. Lookups take a read lock; the first
//! derivation for a name takes the write lock.

use std::collections::HashMap;

use hkdf::Hkdf;
use parking_lot::RwLock;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::StaticSecret;

use crate::codec::{private_topic, topic_for_chat_name};
use crate::error::BridgeResult;
use crate::types::{PeerId, PublicKey, Topic};

/// HKDF info string for room keys.
const ROOM_KEY_INFO: &[u8] = b"relaysync-room-key-v1";

/// Size of a symmetric room key
pub const SYM_KEY_SIZE: usize = 32;

/// Symmetric room key
pub type SymKey = [u8; SYM_KEY_SIZE];

/// How an envelope on a given topic must be encrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    /// Public room: encrypt with the room key
    Symmetric(SymKey),
    /// Private conversation: encrypt to this peer
    Asymmetric(PublicKey),
}

/// Key cache shared by the transport's send path and polling loops
pub struct KeysManager {
    private_key: StaticSecret,
    /// chat name -> room key
    room_keys: RwLock<HashMap<String, SymKey>>,
    /// topic -> encryption mode, for outbound key selection
    topic_keys: RwLock<HashMap<Topic, KeySelection>>,
}

impl KeysManager {
    /// Create a key manager for the node owning `private_key`.
    pub fn new(private_key: StaticSecret) -> Self {
        Self {
            private_key,
            room_keys: RwLock::new(HashMap::new()),
            topic_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Create a key manager with a freshly generated identity.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self::new(StaticSecret::from(seed))
    }

    /// Our public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.private_key)
    }

    /// Our peer id in the sync engine
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }

    /// Our static secret, used by private filters
    pub fn private_key(&self) -> &StaticSecret {
        &self.private_key
    }

    /// Room key for `chat_name`, deriving and caching it on first use.
    ///
    /// Also records the room's topic so outbound sends on that topic pick
    /// the symmetric key.
    pub fn sym_key_for_chat(&self, chat_name: &str) -> BridgeResult<SymKey> {
        if let Some(key) = self.room_keys.read().get(chat_name) {
            return Ok(*key);
        }

        let topic = topic_for_chat_name(chat_name)?;
        let mut room_keys = self.room_keys.write();
        // Another caller may have populated it between the two locks
        let key = *room_keys
            .entry(chat_name.to_string())
            .or_insert_with(|| derive_room_key(chat_name));
        self.topic_keys
            .write()
            .insert(topic, KeySelection::Symmetric(key));
        Ok(key)
    }

    /// Topic of our one-to-one conversation with `peer`.
    ///
    /// Records it so outbound sends on that topic are sealed to `peer`.
    pub fn contact_topic(&self, peer: &PublicKey) -> Topic {
        let topic = private_topic(&self.public_key(), peer);
        self.topic_keys
            .write()
            .insert(topic, KeySelection::Asymmetric(*peer));
        topic
    }

    /// Encryption mode for an envelope on `topic`.
    ///
    /// Returns `None` for a topic that is neither a known contact nor a
    /// known room.
    pub fn select(&self, topic: &Topic) -> Option<KeySelection> {
        self.topic_keys.read().get(topic).cloned()
    }

    /// Number of cached room keys
    pub fn room_count(&self) -> usize {
        self.room_keys.read().len()
    }
}

impl std::fmt::Debug for KeysManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysManager")
            .field("peer_id", &self.peer_id())
            .field("private_key", &"[REDACTED]")
            .field("rooms", &self.room_count())
            .finish()
    }
}

fn derive_room_key(chat_name: &str) -> SymKey {
    let hk = Hkdf::<Sha256>::new(None, chat_name.as_bytes());
    let mut key = [0u8; SYM_KEY_SIZE];
    // 32 bytes is always a valid HKDF-SHA256 output length
    let _ = hk.expand(ROOM_KEY_INFO, &mut key);
    key
}
