//! Per-room fan-out to every connected peer but the sender.
//!
//! Uses tokio broadcast channels: one send reaches every subscriber, and each
//! peer's receiver buffers up to `capacity` frames before it starts lagging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use coedit_core::ClientId;
use tokio::sync::{broadcast, RwLock};

use crate::protocol::{ProtocolError, SyncMessage};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Counters updated on the hot path without taking the peer lock.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// An encoded message tagged with the peer that produced it, so receivers
/// can skip their own frames without decoding.
#[derive(Debug, Clone)]
pub struct Frame {
    pub origin: ClientId,
    pub bytes: Arc<Vec<u8>>,
}

/// A peer connected to a room.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub client_id: ClientId,
    /// Learned from the peer's awareness `Join`
    pub user_name: Option<String>,
    pub joined_at: Instant,
}

/// A broadcast group for a single room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Frame>,
    peers: RwLock<HashMap<ClientId, PeerEntry>>,
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity,
            atomic_stats: AtomicBroadcastStats::new(),
        }
    }

    /// Add a peer and return the receiver it consumes frames from.
    pub async fn add_peer(&self, client_id: ClientId) -> broadcast::Receiver<Frame> {
        let mut peers = self.peers.write().await;
        peers.insert(
            client_id,
            PeerEntry {
                client_id,
                user_name: None,
                joined_at: Instant::now(),
            },
        );
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, client_id: ClientId) -> Option<PeerEntry> {
        self.peers.write().await.remove(&client_id)
    }

    /// Record the display name a peer announced.
    pub async fn set_user_name(&self, client_id: ClientId, user_name: &str) {
        if let Some(peer) = self.peers.write().await.get_mut(&client_id) {
            peer.user_name = Some(user_name.to_string());
        }
    }

    /// Encode `msg` once and fan it out. Returns the number of receivers.
    pub fn broadcast(&self, msg: &SyncMessage) -> Result<usize, ProtocolError> {
        let encoded = msg.encode()?;
        Ok(self.broadcast_raw(msg.client_id, Arc::new(encoded)))
    }

    /// Fan out pre-encoded bytes.
    pub fn broadcast_raw(&self, origin: ClientId, bytes: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(Frame { origin, bytes }).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Account for frames a lagging receiver skipped.
    pub fn record_dropped(&self, count: u64) {
        self.atomic_stats
            .messages_dropped
            .fetch_add(count, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerEntry> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, client_id: ClientId) -> bool {
        self.peers.read().await.contains_key(&client_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        let peers = self.peers.read().await;
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: peers.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
