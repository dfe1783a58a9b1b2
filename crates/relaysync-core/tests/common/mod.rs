//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use relaysync_core::{
    compute_message_id, BridgeResult, GroupId, KeysManager, MemoryBus, Message, MessageId,
    Payload, PeerId, SyncAdapter, SyncNode, SyncRecord, Transport, TransportConfig,
};
use x25519_dalek::StaticSecret;

/// Sync engine operation observed by [`RecordingNode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start,
    AddPeer(GroupId, PeerId),
    Share(GroupId, PeerId),
    Append(GroupId, Vec<u8>),
}

/// Sync engine double recording every call.
///
/// When wired to a transport, each appended message is emitted immediately
/// as a one-message packet: once per group member, or once unaddressed when
/// the group has no members.
pub struct RecordingNode {
    me: PeerId,
    calls: Mutex<Vec<Call>>,
    members: Mutex<HashSet<(GroupId, PeerId)>>,
    transport: Option<Arc<Transport>>,
}

impl RecordingNode {
    pub fn new(me: PeerId) -> Self {
        Self {
            me,
            calls: Mutex::new(Vec::new()),
            members: Mutex::new(HashSet::new()),
            transport: None,
        }
    }

    pub fn wired(transport: Arc<Transport>) -> Self {
        Self {
            me: transport.peer_id(),
            calls: Mutex::new(Vec::new()),
            members: Mutex::new(HashSet::new()),
            transport: Some(transport),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls other than `Start`
    pub fn group_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Start)
            .collect()
    }

    fn members_of(&self, group: GroupId) -> Vec<PeerId> {
        self.members
            .lock()
            .iter()
            .filter(|(g, _)| *g == group)
            .map(|(_, p)| *p)
            .collect()
    }
}

impl SyncNode for RecordingNode {
    fn append_message(&self, group: GroupId, data: &[u8]) -> BridgeResult<MessageId> {
        self.calls.lock().push(Call::Append(group, data.to_vec()));

        let record = SyncRecord {
            group_id: group,
            timestamp: chrono::Utc::now().timestamp(),
            body: data.to_vec(),
        };
        let id = compute_message_id(&group, record.timestamp, data);

        if let Some(transport) = &self.transport {
            let payload = Payload {
                messages: vec![record],
                ..Default::default()
            };
            let members = self.members_of(group);
            if members.is_empty() {
                transport.send(group, self.me, None, &payload)?;
            }
            for peer in members {
                transport.send(group, self.me, Some(peer), &payload)?;
            }
        }

        Ok(id)
    }

    fn add_peer(&self, group: GroupId, peer: PeerId) -> BridgeResult<()> {
        self.calls.lock().push(Call::AddPeer(group, peer));
        self.members.lock().insert((group, peer));
        Ok(())
    }

    fn share(&self, group: GroupId, peer: PeerId) -> BridgeResult<()> {
        self.calls.lock().push(Call::Share(group, peer));
        Ok(())
    }

    fn is_peer_in_group(&self, group: GroupId, peer: PeerId) -> bool {
        self.members.lock().contains(&(group, peer))
    }

    fn start(&self) {
        self.calls.lock().push(Call::Start);
    }
}

pub fn secret(seed: u8) -> StaticSecret {
    StaticSecret::from([seed; 32])
}

/// Transport for a node with identity `seed` attached to `bus`
pub fn transport(bus: &MemoryBus, seed: u8) -> Arc<Transport> {
    let secret = secret(seed);
    let network = Arc::new(bus.node(&secret));
    Arc::new(Transport::new(
        network,
        Arc::new(KeysManager::new(secret)),
        TransportConfig::for_testing(),
    ))
}

/// Adapter over a [`RecordingNode`] that emits its appends through `transport`
pub fn wired_adapter(transport: &Arc<Transport>) -> SyncAdapter {
    SyncAdapter::new(
        Arc::new(RecordingNode::wired(transport.clone())),
        transport.clone(),
    )
}

/// Receive `count` messages or fail after a generous timeout.
pub async fn recv_n(rx: &mut mpsc::Receiver<Message>, count: usize) -> Vec<Message> {
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("subscriber channel closed");
        out.push(message);
    }
    out
}

/// Poll `cond` until it holds or a timeout elapses.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
