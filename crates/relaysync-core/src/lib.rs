//! Relay Sync Core Library
//!
//! Bridges a group-oriented, at-least-once sync engine to a store-and-forward
//! encrypted broadcast network.
//!
//! ## Overview
//!
//! The sync engine addresses 32-byte groups and public-key peers and retries
//! packets until acknowledged. The broadcast network carries TTL-limited,
//! encrypted envelopes on 4-byte topics with no ordering. This crate maps one
//! onto the other and exposes a single [`Protocol`] contract to applications:
//!
//! ```text
//! application ──▶ SyncAdapter ──append──▶ SyncNode ──send──▶ Transport ──▶ network
//! application ◀── subscriber channel ◀── Transport polling loop ◀── network
//!                                           └──packets──▶ SyncNode (watch)
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use relaysync_core::{ChatOptions, KeysManager, MemoryBus, Protocol, SyncAdapter,
//!                      Transport, TransportConfig};
//!
//! let keys = Arc::new(KeysManager::generate());
//! let network = Arc::new(bus.node(keys.private_key()));
//! let transport = Arc::new(Transport::new(network, keys, TransportConfig::default()));
//! let adapter = SyncAdapter::new(my_sync_node, transport);
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let sub = adapter.subscribe(tx, ChatOptions::public("status").into()).await?;
//! adapter.send(&body, ChatOptions::public("status").into()).await?;
//! ```

pub mod adapter;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod logging;
pub mod message;
pub mod message_id;
pub mod network;
pub mod options;
pub mod schedule;
pub mod subscription;
pub mod transport;
pub mod types;

// Re-exports
pub use adapter::{Protocol, SyncAdapter};
pub use codec::{group_for_topic, private_topic, topic_for_chat_name, topic_for_group};
pub use config::TransportConfig;
pub use engine::{PacketTransport, SyncNode};
pub use error::{BridgeError, BridgeResult};
pub use keys::KeysManager;
pub use message::{ChatMessage, Message, MessageType};
pub use message_id::compute_message_id;
pub use network::{BroadcastNetwork, MemoryBus, MemoryNetwork};
pub use options::{ChatOptions, RequestOptions, SendOptions, SubscribeOptions};
pub use schedule::next_send_time;
pub use subscription::Subscription;
pub use transport::{StatsSnapshot, Transport};
pub use types::*;
