//! Sync engine collaborator
//!
//! The sync engine owns durable, acknowledgement-driven replication. This
//! crate only calls its published operations and feeds it inbound packets:
//!
//! ```text
//!   SyncAdapter ──append/add_peer/share──▶ SyncNode
//!                                             │  ▲
//!                             send(packet)    │  │ watch()
//!                                             ▼  │
//!                                          PacketTransport
//! ```
//!
//! Implementations provide their own internal concurrency control.

use async_trait::async_trait;

use crate::error::BridgeResult;
use crate::types::{GroupId, MessageId, Packet, Payload, PeerId};

/// Operations of the sync engine used by the adapter
pub trait SyncNode: Send + Sync {
    /// Append opaque data to `group`; returns the generated packet id.
    fn append_message(&self, group: GroupId, data: &[u8]) -> BridgeResult<MessageId>;

    /// Register `peer` as a member of `group`.
    fn add_peer(&self, group: GroupId, peer: PeerId) -> BridgeResult<()>;

    /// Start replicating the state of `group` to `peer`.
    fn share(&self, group: GroupId, peer: PeerId) -> BridgeResult<()>;

    /// Whether `peer` is already a member of `group`.
    fn is_peer_in_group(&self, group: GroupId, peer: PeerId) -> bool;

    /// Spawn the engine's background run loop. Called once by the adapter.
    fn start(&self);
}

/// What the sync engine sees of the network
#[async_trait]
pub trait PacketTransport: Send + Sync {
    /// Wait for the next inbound packet.
    ///
    /// Returns `None` once no more packets can arrive.
    async fn watch(&self) -> Option<Packet>;

    /// Emit `payload` from `from` to `to` within `group`.
    ///
    /// Not retried; retries belong to the engine.
    fn send(
        &self,
        group: GroupId,
        from: PeerId,
        to: Option<PeerId>,
        payload: &Payload,
    ) -> BridgeResult<()>;
}
