//! Broadcast transport for sync engine packets
//!
//! Outbound, a sync engine [`Payload`] is serialized and posted as an
//! envelope on the topic of its group. Inbound, one polling loop per
//! subscription drains matching envelopes every tick:
//!
//! ```text
//! tick ──▶ network.messages(filter)
//!            │ for each envelope
//!            ├── decode Payload          (failure: log, skip envelope)
//!            ├── Packet { group(topic), sender(src), payload }
//!            │      └──▶ inbound packet channel ──▶ SyncNode (watch)
//!            └── decode bodies           (failure: drop that body)
//!                   └── sort by clock ──▶ subscriber channel
//! ```
//!
//! Both channel sends block when full, which throttles the loop instead of
//! dropping data. Ordering is restored within one envelope only; two
//! envelopes drained in the same tick are processed in the order the
//! network returned them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::codec::{group_for_topic, topic_for_chat_name, topic_for_group};
use crate::config::TransportConfig;
use crate::engine::PacketTransport;
use crate::error::{BridgeError, BridgeResult};
use crate::keys::{KeySelection, KeysManager};
use crate::message::{ChatMessage, Message};
use crate::network::{
    BroadcastNetwork, EnvelopeKey, Filter, FilterId, FilterKey, NewEnvelope, ReceivedEnvelope,
};
use crate::options::{ChatOptions, SubscribeOptions};
use crate::subscription::Subscription;
use crate::types::{GroupId, Packet, Payload, PeerId, PublicKey, Topic};

/// Lower bound on the polling interval
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Counters for inbound traffic the transport had to drop
#[derive(Debug, Default)]
pub struct TransportStats {
    envelopes_received: AtomicU64,
    envelopes_dropped: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub envelopes_received: u64,
    /// Envelopes whose payload was not a packet or had no origin
    pub envelopes_dropped: u64,
    pub messages_delivered: u64,
    /// Message bodies that failed to decode
    pub messages_dropped: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            envelopes_received: self.envelopes_received.load(Ordering::Relaxed),
            envelopes_dropped: self.envelopes_dropped.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Owns the encrypted broadcast channel on behalf of the sync engine
pub struct Transport {
    network: Arc<dyn BroadcastNetwork>,
    keys: Arc<KeysManager>,
    config: TransportConfig,
    packets_tx: mpsc::Sender<Packet>,
    packets_rx: Mutex<mpsc::Receiver<Packet>>,
    stats: Arc<TransportStats>,
}

impl Transport {
    /// Create a transport posting through `network` as the owner of `keys`.
    pub fn new(
        network: Arc<dyn BroadcastNetwork>,
        keys: Arc<KeysManager>,
        config: TransportConfig,
    ) -> Self {
        let (packets_tx, packets_rx) = mpsc::channel(config.inbound_capacity.max(1));
        Self {
            network,
            keys,
            config,
            packets_tx,
            packets_rx: Mutex::new(packets_rx),
            stats: Arc::new(TransportStats::default()),
        }
    }

    /// Key manager shared with the polling loops
    pub fn keys(&self) -> &Arc<KeysManager> {
        &self.keys
    }

    /// Our peer id in the sync engine
    pub fn peer_id(&self) -> PeerId {
        self.keys.peer_id()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Counters of delivered and dropped inbound traffic
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve a destination to its topic and record how later sends on
    /// that topic are encrypted: the room key of a public chat, or the
    /// recipient of a one-to-one conversation.
    pub fn resolve(&self, chat: &ChatOptions) -> BridgeResult<Topic> {
        chat.validate()?;
        match &chat.recipient {
            Some(recipient) => Ok(self.keys.contact_topic(recipient)),
            None => {
                self.keys.sym_key_for_chat(&chat.chat_name)?;
                topic_for_chat_name(&chat.chat_name)
            }
        }
    }

    /// Serialize `payload` and post it on the topic of `group`.
    ///
    /// Public rooms are sealed with the room key. A conversation topic is
    /// sealed to its peer; `to`, when given, must be that peer.
    pub fn send(
        &self,
        group: GroupId,
        from: PeerId,
        to: Option<PeerId>,
        payload: &Payload,
    ) -> BridgeResult<()> {
        let data = payload
            .encode()
            .map_err(|e| BridgeError::Serialization(format!("Failed to encode payload: {}", e)))?;

        let topic = topic_for_group(&group);
        let key = match self.keys.select(&topic) {
            Some(KeySelection::Symmetric(room_key)) => EnvelopeKey::Symmetric(room_key),
            Some(KeySelection::Asymmetric(peer)) => {
                if let Some(to) = to {
                    if to != PeerId::from_public_key(&peer) {
                        return Err(BridgeError::Transport(format!(
                            "{} is not the peer of conversation topic {}",
                            to, topic
                        )));
                    }
                }
                EnvelopeKey::Asymmetric(peer)
            }
            None => {
                return Err(BridgeError::Transport(format!(
                    "no encryption key known for topic {}",
                    topic
                )))
            }
        };

        let hash = self.network.post(NewEnvelope {
            topic,
            payload: data,
            key,
            ttl_secs: self.config.ttl_secs,
            pow_target: self.config.pow_target,
            pow_time_secs: self.config.pow_time_secs,
        })?;

        debug!(
            %group,
            %from,
            to = ?to.map(|p| p.to_string()),
            %topic,
            %hash,
            messages = payload.messages.len(),
            "Packet posted"
        );
        Ok(())
    }

    /// Register a filter for the destination in `options` and start its
    /// polling loop. Must be called within a tokio runtime.
    ///
    /// Returns immediately; decoded messages are delivered to `output`.
    pub fn subscribe(
        &self,
        output: mpsc::Sender<Message>,
        options: &SubscribeOptions,
    ) -> BridgeResult<Subscription> {
        options.validate()?;

        let filter = self.filter_for(&options.chat)?;
        let filter_id = self.network.subscribe(filter)?;
        info!(filter = %filter_id, chat = %options.chat.chat_name, "Subscribed");

        let subscription = Subscription::new();
        let poller = Poller {
            network: self.network.clone(),
            packets_tx: self.packets_tx.clone(),
            stats: self.stats.clone(),
            poll_interval: self.config.poll_interval.max(MIN_POLL_INTERVAL),
        };
        tokio::spawn(poller.run(filter_id, output, subscription.clone()));

        Ok(subscription)
    }

    fn filter_for(&self, chat: &ChatOptions) -> BridgeResult<Filter> {
        match &chat.recipient {
            Some(recipient) => Ok(Filter {
                topics: vec![self.keys.contact_topic(recipient)],
                key: FilterKey::Asymmetric(self.keys.private_key().clone()),
                source: Some(*recipient),
            }),
            None => Ok(Filter {
                topics: vec![topic_for_chat_name(&chat.chat_name)?],
                key: FilterKey::Symmetric(self.keys.sym_key_for_chat(&chat.chat_name)?),
                source: None,
            }),
        }
    }
}

#[async_trait]
impl PacketTransport for Transport {
    async fn watch(&self) -> Option<Packet> {
        self.packets_rx.lock().await.recv().await
    }

    fn send(
        &self,
        group: GroupId,
        from: PeerId,
        to: Option<PeerId>,
        payload: &Payload,
    ) -> BridgeResult<()> {
        Transport::send(self, group, from, to, payload)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("keys", &self.keys)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// State owned by one subscription's polling loop
struct Poller {
    network: Arc<dyn BroadcastNetwork>,
    packets_tx: mpsc::Sender<Packet>,
    stats: Arc<TransportStats>,
    poll_interval: Duration,
}

impl Poller {
    async fn run(self, filter_id: FilterId, output: mpsc::Sender<Message>, sub: Subscription) {
        debug!(filter = %filter_id, "Polling loop started");

        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let received = match self.network.messages(&filter_id) {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(
                                filter = %filter_id,
                                error = %e,
                                "Polling failed, terminating subscription"
                            );
                            sub.cancel(BridgeError::Subscription(e.to_string()));
                            break;
                        }
                    };

                    // The whole batch is handled before cancellation is observed
                    if let Err(e) = self.process_batch(received, &output).await {
                        warn!(
                            filter = %filter_id,
                            error = %e,
                            "Delivery failed, terminating subscription"
                        );
                        sub.cancel(e);
                        break;
                    }
                }
                _ = sub.done() => break,
            }
        }

        if let Err(e) = self.network.unsubscribe(&filter_id) {
            debug!(filter = %filter_id, error = %e, "Filter already gone");
        }
        debug!(filter = %filter_id, "Polling loop ended");
    }

    async fn process_batch(
        &self,
        received: Vec<ReceivedEnvelope>,
        output: &mpsc::Sender<Message>,
    ) -> BridgeResult<()> {
        for envelope in received {
            self.stats.envelopes_received.fetch_add(1, Ordering::Relaxed);

            let Some(src) = envelope.src else {
                warn!(hash = %envelope.hash, "Envelope has no origin, skipping");
                self.stats.envelopes_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let payload = match Payload::decode(&envelope.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(hash = %envelope.hash, error = %e, "Failed to decode packet, skipping");
                    self.stats.envelopes_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let (messages, dropped) = decode_messages(&payload, &src);
            self.stats
                .messages_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);

            let packet = Packet {
                group: group_for_topic(&envelope.topic),
                sender: PeerId::from_public_key(&src),
                payload,
            };
            self.packets_tx.send(packet).await.map_err(|_| {
                BridgeError::Subscription("inbound packet channel closed".to_string())
            })?;

            for message in messages {
                output.send(message).await.map_err(|_| {
                    BridgeError::Subscription("subscriber channel closed".to_string())
                })?;
                self.stats.messages_delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

/// Decode every body embedded in `payload`, attach `sender`, and sort the
/// result by logical clock. Bodies that fail to decode are dropped; their
/// count is returned alongside.
pub fn decode_messages(payload: &Payload, sender: &PublicKey) -> (Vec<Message>, usize) {
    let mut dropped = 0;
    let mut messages: Vec<Message> = payload
        .messages
        .iter()
        .filter_map(|record| match ChatMessage::decode(&record.body) {
            Ok(decoded) => Some(Message {
                decoded,
                sig_pub_key: Some(*sender),
                id: record.id(),
            }),
            Err(e) => {
                debug!(group = %record.group_id, error = %e, "Dropping undecodable message");
                dropped += 1;
                None
            }
        })
        .collect();

    messages.sort_by_key(Message::clock);
    (messages, dropped)
}
