//! Awareness channel: ephemeral per-peer presence exchanged next to
//! document updates.
//!
//! ## Architecture
//!
//! ```text
//! Editor::set_selection()
//!       │
//!       ▼
//! Awareness::set_local_cursor()     (rate-limited, default 33ms)
//!       │
//!       ▼
//! AwarenessMessage::Cursor { … }  ──► outgoing channel ──► transport
//!
//! transport ──► Awareness::apply_remote() ──► RemotePeer state
//!                                                  │
//!                                                  ▼
//!                                       Binding::remote_cursors()
//! ```
//!
//! Nothing here is persisted or replicated through the CRDT; a peer that
//! reconnects simply announces itself again.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::editor::Selection;
use crate::key::DocumentKey;
use crate::lock;

/// Replica identity; the yrs client id of the peer's document.
pub type ClientId = u64;

// ───────────────────────────────────────────────────────────────────
// Colors
// ───────────────────────────────────────────────────────────────────

/// RGBA color used to tell collaborators apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    /// Stable, vivid color derived from a client id.
    pub fn from_client_id(id: ClientId) -> Self {
        let hue = ((id % 360) as f32) / 360.0;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self { r: 0.26, g: 0.52, b: 0.96, a: 1.0 }
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Wire messages
// ───────────────────────────────────────────────────────────────────

/// Awareness updates exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AwarenessMessage {
    /// Announce the peer and its profile.
    Join {
        client_id: ClientId,
        user_name: String,
        user_color: CursorColor,
    },

    /// Clean disconnect.
    Leave { client_id: ClientId },

    /// Cursor in one document (high frequency, rate-limited).
    Cursor {
        client_id: ClientId,
        key: DocumentKey,
        selection: Selection,
        /// Monotonic per-sender counter; stale updates are dropped.
        clock: u64,
    },

    /// The peer no longer shows a cursor in `key`.
    ClearCursor {
        client_id: ClientId,
        key: DocumentKey,
        clock: u64,
    },
}

impl AwarenessMessage {
    pub fn client_id(&self) -> ClientId {
        match self {
            AwarenessMessage::Join { client_id, .. }
            | AwarenessMessage::Leave { client_id }
            | AwarenessMessage::Cursor { client_id, .. }
            | AwarenessMessage::ClearCursor { client_id, .. } => *client_id,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Remote peers
// ───────────────────────────────────────────────────────────────────

/// What we know about one remote collaborator.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    pub client_id: ClientId,
    pub user_name: String,
    pub color: CursorColor,
    cursors: HashMap<DocumentKey, Selection>,
    last_clock: u64,
    last_update: Instant,
}

impl RemotePeer {
    fn new(client_id: ClientId, user_name: String, color: CursorColor) -> Self {
        Self {
            client_id,
            user_name,
            color,
            cursors: HashMap::new(),
            last_clock: 0,
            last_update: Instant::now(),
        }
    }

    /// Placeholder for a peer whose `Join` we missed.
    fn unannounced(client_id: ClientId) -> Self {
        Self::new(
            client_id,
            format!("peer-{client_id}"),
            CursorColor::from_client_id(client_id),
        )
    }

    fn accept_clock(&mut self, clock: u64) -> bool {
        if clock < self.last_clock {
            return false;
        }
        self.last_clock = clock;
        self.last_update = Instant::now();
        true
    }

    pub fn cursor(&self, key: &DocumentKey) -> Option<Selection> {
        self.cursors.get(key).copied()
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_update.elapsed() > timeout
    }
}

/// A remote cursor to draw in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub client_id: ClientId,
    pub user_name: String,
    pub color: CursorColor,
    pub selection: Selection,
}

// ───────────────────────────────────────────────────────────────────
// Awareness state
// ───────────────────────────────────────────────────────────────────

struct AwarenessState {
    peers: HashMap<ClientId, RemotePeer>,
    local_cursors: HashMap<DocumentKey, Selection>,
    /// Cursors changed while throttled; emitted by `flush`
    dirty: HashSet<DocumentKey>,
    clock: u64,
    last_cursor_broadcast: Option<Instant>,
    outgoing: Option<mpsc::UnboundedSender<AwarenessMessage>>,
}

/// Shared awareness channel for one replicated document.
pub struct Awareness {
    client_id: ClientId,
    user_name: String,
    color: CursorColor,
    cursor_interval: Duration,
    state: Mutex<AwarenessState>,
}

impl Awareness {
    pub fn new(client_id: ClientId, user_name: impl Into<String>) -> Self {
        Self::with_interval(client_id, user_name, Duration::from_millis(33))
    }

    pub fn with_interval(client_id: ClientId, user_name: impl Into<String>, cursor_interval: Duration) -> Self {
        Self {
            client_id,
            user_name: user_name.into(),
            color: CursorColor::from_client_id(client_id),
            cursor_interval,
            state: Mutex::new(AwarenessState {
                peers: HashMap::new(),
                local_cursors: HashMap::new(),
                dirty: HashSet::new(),
                clock: 0,
                last_cursor_broadcast: None,
                outgoing: None,
            }),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn color(&self) -> CursorColor {
        self.color
    }

    /// Route outgoing messages to a new receiver, replacing any previous one.
    pub fn subscribe_outgoing(&self) -> mpsc::UnboundedReceiver<AwarenessMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).outgoing = Some(tx);
        rx
    }

    pub fn unsubscribe_outgoing(&self) {
        lock(&self.state).outgoing = None;
    }

    pub fn join_message(&self) -> AwarenessMessage {
        AwarenessMessage::Join {
            client_id: self.client_id,
            user_name: self.user_name.clone(),
            user_color: self.color,
        }
    }

    pub fn leave_message(&self) -> AwarenessMessage {
        AwarenessMessage::Leave {
            client_id: self.client_id,
        }
    }

    /// Full local state, sent after (re)connecting.
    pub fn local_state_messages(&self) -> Vec<AwarenessMessage> {
        let mut state = lock(&self.state);
        let mut messages = vec![self.join_message()];
        let cursors: Vec<_> = state
            .local_cursors
            .iter()
            .map(|(k, s)| (k.clone(), *s))
            .collect();
        for (key, selection) in cursors {
            state.clock += 1;
            messages.push(AwarenessMessage::Cursor {
                client_id: self.client_id,
                key,
                selection,
                clock: state.clock,
            });
        }
        state.dirty.clear();
        messages
    }

    /// Record the local cursor for `key` and broadcast it unless throttled.
    ///
    /// Returns whether a message went out. A throttled update is kept and
    /// sent by the next [`flush`](Self::flush).
    pub fn set_local_cursor(&self, key: &DocumentKey, selection: Selection) -> bool {
        let mut state = lock(&self.state);
        if state.local_cursors.get(key) == Some(&selection) {
            return false;
        }
        state.local_cursors.insert(key.clone(), selection);

        let throttled = state
            .last_cursor_broadcast
            .is_some_and(|last| last.elapsed() < self.cursor_interval);
        if throttled {
            state.dirty.insert(key.clone());
            return false;
        }
        state.dirty.remove(key);
        self.emit_cursor(&mut state, key.clone(), selection);
        true
    }

    pub fn local_cursor(&self, key: &DocumentKey) -> Option<Selection> {
        lock(&self.state).local_cursors.get(key).copied()
    }

    /// Forget the local cursor for `key` and tell peers.
    pub fn clear_local_cursor(&self, key: &DocumentKey) {
        let mut state = lock(&self.state);
        if state.local_cursors.remove(key).is_none() {
            return;
        }
        state.dirty.remove(key);
        state.clock += 1;
        let message = AwarenessMessage::ClearCursor {
            client_id: self.client_id,
            key: key.clone(),
            clock: state.clock,
        };
        Self::send(&mut state, message);
    }

    /// Emit cursors held back by rate limiting. Returns how many went out.
    pub fn flush(&self) -> usize {
        let mut state = lock(&self.state);
        let dirty: Vec<DocumentKey> = state.dirty.drain().collect();
        let mut sent = 0;
        for key in dirty {
            if let Some(selection) = state.local_cursors.get(&key).copied() {
                self.emit_cursor(&mut state, key, selection);
                sent += 1;
            }
        }
        sent
    }

    fn emit_cursor(&self, state: &mut AwarenessState, key: DocumentKey, selection: Selection) {
        state.clock += 1;
        state.last_cursor_broadcast = Some(Instant::now());
        let message = AwarenessMessage::Cursor {
            client_id: self.client_id,
            key,
            selection,
            clock: state.clock,
        };
        Self::send(state, message);
    }

    fn send(state: &mut AwarenessState, message: AwarenessMessage) {
        if let Some(tx) = &state.outgoing {
            if tx.send(message).is_err() {
                log::debug!("Awareness subscriber went away, dropping outgoing channel");
                state.outgoing = None;
            }
        }
    }

    /// Apply a message received from a peer. Our own messages are ignored.
    pub fn apply_remote(&self, message: &AwarenessMessage) {
        if message.client_id() == self.client_id {
            return;
        }
        let mut state = lock(&self.state);
        match message {
            AwarenessMessage::Join { client_id, user_name, user_color } => {
                let peer = state
                    .peers
                    .entry(*client_id)
                    .or_insert_with(|| RemotePeer::unannounced(*client_id));
                peer.user_name = user_name.clone();
                peer.color = *user_color;
                peer.last_update = Instant::now();
                log::debug!("Awareness: {user_name} ({client_id}) joined");
            }
            AwarenessMessage::Leave { client_id } => {
                state.peers.remove(client_id);
                log::debug!("Awareness: {client_id} left");
            }
            AwarenessMessage::Cursor { client_id, key, selection, clock } => {
                let peer = state
                    .peers
                    .entry(*client_id)
                    .or_insert_with(|| RemotePeer::unannounced(*client_id));
                if peer.accept_clock(*clock) {
                    peer.cursors.insert(key.clone(), *selection);
                }
            }
            AwarenessMessage::ClearCursor { client_id, key, clock } => {
                if let Some(peer) = state.peers.get_mut(client_id) {
                    if peer.accept_clock(*clock) {
                        peer.cursors.remove(key);
                    }
                }
            }
        }
    }

    /// Cursors of remote peers currently in `key`, ordered by client id.
    pub fn remote_cursors(&self, key: &DocumentKey) -> Vec<RemoteCursor> {
        let state = lock(&self.state);
        let mut cursors: Vec<RemoteCursor> = state
            .peers
            .values()
            .filter_map(|peer| {
                peer.cursor(key).map(|selection| RemoteCursor {
                    client_id: peer.client_id,
                    user_name: peer.user_name.clone(),
                    color: peer.color,
                    selection,
                })
            })
            .collect();
        cursors.sort_by_key(|c| c.client_id);
        cursors
    }

    pub fn peer(&self, client_id: ClientId) -> Option<RemotePeer> {
        lock(&self.state).peers.get(&client_id).cloned()
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.state).peers.len()
    }

    /// Drop peers silent for longer than `timeout`; returns their ids.
    pub fn prune_idle(&self, timeout: Duration) -> Vec<ClientId> {
        let mut state = lock(&self.state);
        let idle: Vec<ClientId> = state
            .peers
            .values()
            .filter(|p| p.is_idle(timeout))
            .map(|p| p.client_id)
            .collect();
        for id in &idle {
            state.peers.remove(id);
        }
        idle
    }

    /// Forget every remote peer, e.g. after the connection dropped.
    pub fn clear_remote(&self) {
        lock(&self.state).peers.clear();
    }
}

impl std::fmt::Debug for Awareness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Awareness")
            .field("client_id", &self.client_id)
            .field("user_name", &self.user_name)
            .field("peers", &self.peer_count())
            .finish()
    }
}
