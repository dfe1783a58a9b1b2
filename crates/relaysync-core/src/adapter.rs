//! Uniform protocol contract over the sync engine and the transport
//!
//! Application code sees only [`Protocol`]: subscribe to a destination,
//! send opaque bytes to it, request history. The [`SyncAdapter`] turns a
//! send into a sync engine append, after making sure a private recipient
//! is a member of the destination group:
//!
//! ```text
//! send(data, opts)
//!   ├── validate opts               (InvalidOptions, no side effects)
//!   ├── destination ─▶ Topic ─▶ GroupId
//!   ├── recipient not in group?  ─▶ add_peer + share   (once per peer)
//!   └── append_message(group, data) ─▶ packet id
//! ```
//!
//! The engine later emits the packet through [`Transport::send`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::codec::group_for_topic;
use crate::engine::SyncNode;
use crate::error::BridgeResult;
use crate::message::Message;
use crate::options::{RequestOptions, SendOptions, SubscribeOptions};
use crate::subscription::Subscription;
use crate::transport::Transport;
use crate::types::{GroupId, MessageId, PeerId, PublicKey};

/// Send/subscribe/request contract exposed to application code
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Deliver decoded messages for a destination to `messages`.
    async fn subscribe(
        &self,
        messages: mpsc::Sender<Message>,
        options: SubscribeOptions,
    ) -> BridgeResult<Subscription>;

    /// Send `data` to a destination; returns the generated message id.
    async fn send(&self, data: &[u8], options: SendOptions) -> BridgeResult<MessageId>;

    /// Retrieve historic messages.
    async fn request(&self, options: RequestOptions) -> BridgeResult<()>;
}

/// [`Protocol`] implementation backed by a sync engine
pub struct SyncAdapter {
    node: Arc<dyn SyncNode>,
    transport: Arc<Transport>,
    /// Serializes the membership check with add_peer/share
    peer_lock: Mutex<()>,
}

impl SyncAdapter {
    /// Create the adapter and start the sync engine's run loop.
    pub fn new(node: Arc<dyn SyncNode>, transport: Arc<Transport>) -> Self {
        node.start();
        info!(peer = %transport.peer_id(), "Sync adapter started");
        Self {
            node,
            transport,
            peer_lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Make `recipient` a member of `group`, sharing existing state with it.
    ///
    /// No-op when there is no recipient or it is already a member.
    fn ensure_peer(&self, group: GroupId, recipient: Option<&PublicKey>) -> BridgeResult<()> {
        let Some(recipient) = recipient else {
            return Ok(());
        };
        let peer = PeerId::from_public_key(recipient);

        let _guard = self.peer_lock.lock();
        if self.node.is_peer_in_group(group, peer) {
            debug!(%group, %peer, "Peer already in group");
            return Ok(());
        }

        info!(%group, %peer, "Adding peer to group");
        self.node.add_peer(group, peer)?;
        self.node.share(group, peer)?;
        Ok(())
    }
}

#[async_trait]
impl Protocol for SyncAdapter {
    async fn subscribe(
        &self,
        messages: mpsc::Sender<Message>,
        options: SubscribeOptions,
    ) -> BridgeResult<Subscription> {
        options.validate()?;
        self.transport.subscribe(messages, &options)
    }

    async fn send(&self, data: &[u8], options: SendOptions) -> BridgeResult<MessageId> {
        options.validate()?;

        let topic = self.transport.resolve(&options.chat)?;
        let group = group_for_topic(&topic);

        self.ensure_peer(group, options.chat.recipient.as_ref())?;

        let id = self.node.append_message(group, data)?;
        debug!(%group, %id, len = data.len(), "Message appended");
        Ok(id)
    }

    /// Always succeeds: history reaches known peers through the engine's
    /// replication, not through point-in-time requests.
    async fn request(&self, options: RequestOptions) -> BridgeResult<()> {
        debug!(
            chat = %options.chat.chat_name,
            from = options.from,
            to = options.to,
            "History request served by replication"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SyncAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncAdapter")
            .field("transport", &self.transport)
            .finish()
    }
}
