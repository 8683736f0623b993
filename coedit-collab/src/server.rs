//! WebSocket sync server with room-based routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!            ├── Room (name) ── yrs Doc ("texts" map) ── BroadcastGroup
//! Client B ──┘                     ▲
//!                                  │ RequestContent{key}
//!                            ContentSource (fs / memory)
//! ```
//!
//! Each room holds the authoritative document every peer converges on. The
//! first message a connection sends names its room; from then on the
//! connection relays updates and awareness through the room's broadcast
//! group and seeds missing texts from the content source on request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use coedit_core::{AwarenessMessage, ClientId, DocumentKey, Result, SHARED_TEXTS};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Map, MapRef, ReadTxn, StateVector, TextPrelim, Transact, Update};

use crate::broadcast::{BroadcastGroup, Frame};
use crate::content::{ContentSource, FsContentSource};
use crate::protocol::{send_message, ConnectionResult, MessageType, SyncMessage, SERVER_CLIENT_ID};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum peers per room
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Connections silent for three intervals are dropped
    pub heartbeat_interval_secs: u64,
    /// Directory `file://` keys resolve under (None = absolute paths as-is)
    pub content_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:12345".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
            heartbeat_interval_secs: 30,
            content_root: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1) * 3)
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
    pub rejected_peers: u64,
    pub content_requests: u64,
    pub seeded_texts: u64,
}

/// Room: authoritative doc + broadcast group.
struct Room {
    doc: Doc,
    texts: MapRef,
    broadcast: Arc<BroadcastGroup>,
}

impl Room {
    fn new(broadcast_capacity: usize) -> Self {
        let doc = Doc::new();
        let texts = doc.get_or_insert_map(SHARED_TEXTS);
        Self {
            doc,
            texts,
            broadcast: Arc::new(BroadcastGroup::new(broadcast_capacity)),
        }
    }

    fn apply_update(&self, payload: &[u8]) -> std::result::Result<(), String> {
        let update = Update::decode_v1(payload).map_err(|e| e.to_string())?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update).map_err(|e| e.to_string())
    }

    fn has_text(&self, key: &DocumentKey) -> bool {
        let txn = self.doc.transact();
        self.texts.contains_key(&txn, key.as_str())
    }

    /// Insert `content` under `key` unless a text is already there.
    /// Returns the update to broadcast.
    fn seed_text(&self, key: &DocumentKey, content: &str) -> Option<Vec<u8>> {
        let mut txn = self.doc.transact_mut();
        if self.texts.contains_key(&txn, key.as_str()) {
            return None;
        }
        self.texts
            .insert(&mut txn, key.as_str(), TextPrelim::new(content));
        Some(txn.encode_update_v1())
    }
}

type Rooms = Arc<RwLock<HashMap<String, Room>>>;

/// State shared by every connection task.
#[derive(Clone)]
struct ServerContext {
    config: ServerConfig,
    rooms: Rooms,
    stats: Arc<RwLock<ServerStats>>,
    content: Arc<dyn ContentSource>,
}

/// Per-connection state, filled in by the first message.
struct Session {
    addr: SocketAddr,
    client_id: Option<ClientId>,
    room: Option<String>,
    group: Option<Arc<BroadcastGroup>>,
    frames: Option<broadcast::Receiver<Frame>>,
    last_seen: Instant,
}

enum Flow {
    Continue,
    Close,
}

/// The sync server.
pub struct SyncServer {
    ctx: ServerContext,
}

impl SyncServer {
    /// Create a server that seeds texts from the filesystem.
    pub fn new(config: ServerConfig) -> Self {
        let content = Arc::new(FsContentSource::new(config.content_root.clone()));
        Self::with_content_source(config, content)
    }

    pub fn with_content_source(config: ServerConfig, content: Arc<dyn ContentSource>) -> Self {
        Self {
            ctx: ServerContext {
                config,
                rooms: Arc::new(RwLock::new(HashMap::new())),
                stats: Arc::new(RwLock::new(ServerStats::default())),
                content,
            },
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve until an accept error.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        log::info!("Sync server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, ctx).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    pub async fn stats(&self) -> ServerStats {
        self.ctx.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.ctx.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    pub async fn room_count(&self) -> usize {
        self.ctx.rooms.read().await.len()
    }

    pub async fn peer_count(&self, room: &str) -> usize {
        let group = {
            let rooms = self.ctx.rooms.read().await;
            rooms.get(room).map(|r| r.broadcast.clone())
        };
        match group {
            Some(group) => group.peer_count().await,
            None => 0,
        }
    }

    /// Content of a shared text in a room, if present.
    pub async fn text_content(&self, room: &str, key: &DocumentKey) -> Option<String> {
        let rooms = self.ctx.rooms.read().await;
        let room = rooms.get(room)?;
        let txn = room.doc.transact();
        match room.texts.get(&txn, key.as_str())? {
            yrs::Out::YText(text) => Some(yrs::GetString::get_string(&text, &txn)),
            _ => None,
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ServerContext,
) -> ConnectionResult<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    log::info!("WebSocket connection established from {addr}");

    {
        let mut s = ctx.stats.write().await;
        s.total_connections += 1;
        s.active_connections += 1;
    }

    let mut session = Session {
        addr,
        client_id: None,
        room: None,
        group: None,
        frames: None,
        last_seen: Instant::now(),
    };
    let mut heartbeat = tokio::time::interval(Duration::from_secs(
        ctx.config.heartbeat_interval_secs.max(1),
    ));

    let outcome: ConnectionResult<()> = async {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            session.last_seen = Instant::now();
                            match SyncMessage::decode(&bytes) {
                                Ok(sync_msg) => {
                                    {
                                        let mut s = ctx.stats.write().await;
                                        s.total_messages += 1;
                                        s.total_bytes += bytes.len() as u64;
                                    }
                                    let flow = ctx
                                        .handle_message(&mut session, sync_msg, bytes, &mut ws_sender)
                                        .await?;
                                    if let Flow::Close = flow {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    log::warn!("Failed to decode message from {addr}: {e}");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            session.last_seen = Instant::now();
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                frame = async {
                    match session.frames.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(frame) => {
                            if Some(frame.origin) == session.client_id {
                                continue;
                            }
                            ws_sender.send(Message::Binary(frame.bytes.to_vec().into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Peer {:?} lagged by {n} messages", session.client_id);
                            if let Some(group) = &session.group {
                                group.record_dropped(n);
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = heartbeat.tick() => {
                    if session.last_seen.elapsed() > ctx.config.idle_timeout() {
                        log::warn!("Peer {:?} at {addr} timed out", session.client_id);
                        break;
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    ctx.leave(&session).await;
    outcome
}

impl ServerContext {
    async fn handle_message<S>(
        &self,
        session: &mut Session,
        msg: SyncMessage,
        bytes: Vec<u8>,
        ws_sender: &mut S,
    ) -> ConnectionResult<Flow>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        if session.room.is_none() {
            if !self.join(session, &msg).await {
                return Ok(Flow::Close);
            }
        } else if session.room.as_deref() != Some(msg.room.as_str()) {
            log::warn!(
                "Peer {} sent a message for room {} after joining {:?}",
                msg.client_id,
                msg.room,
                session.room
            );
            return Ok(Flow::Continue);
        }
        let room_name = msg.room.clone();

        match msg.msg_type {
            MessageType::SyncStep1 => {
                let replies = {
                    let rooms = self.rooms.read().await;
                    let Some(room) = rooms.get(&room_name) else {
                        return Ok(Flow::Continue);
                    };
                    let txn = room.doc.transact();
                    match StateVector::decode_v1(&msg.payload) {
                        Ok(remote_sv) => Some((
                            txn.encode_diff_v1(&remote_sv),
                            txn.state_vector().encode_v1(),
                        )),
                        Err(e) => {
                            log::warn!("Bad state vector from peer {}: {e}", msg.client_id);
                            None
                        }
                    }
                };
                if let Some((diff, sv)) = replies {
                    send_message(ws_sender, &SyncMessage::sync_step2(SERVER_CLIENT_ID, &room_name, diff))
                        .await?;
                    send_message(ws_sender, &SyncMessage::sync_step1(SERVER_CLIENT_ID, &room_name, sv))
                        .await?;
                }
            }

            MessageType::SyncStep2 | MessageType::Update => {
                let group = {
                    let rooms = self.rooms.read().await;
                    let Some(room) = rooms.get(&room_name) else {
                        return Ok(Flow::Continue);
                    };
                    if let Err(e) = room.apply_update(&msg.payload) {
                        log::warn!("Rejected update from peer {}: {e}", msg.client_id);
                        return Ok(Flow::Continue);
                    }
                    room.broadcast.clone()
                };
                // Handshake diffs reach the other peers as plain updates
                if msg.msg_type == MessageType::SyncStep2 {
                    let update = SyncMessage::update(msg.client_id, &room_name, msg.payload);
                    group.broadcast(&update)?;
                } else {
                    group.broadcast_raw(msg.client_id, Arc::new(bytes));
                }
            }

            MessageType::Awareness => {
                let Some(group) = &session.group else {
                    return Ok(Flow::Continue);
                };
                match msg.awareness_message() {
                    Ok(AwarenessMessage::Join { client_id, user_name, .. }) => {
                        group.set_user_name(client_id, &user_name).await;
                        log::info!("Presence: {user_name} joined room {room_name}");
                    }
                    Ok(AwarenessMessage::Leave { client_id }) => {
                        log::info!("Presence: {client_id} left room {room_name}");
                    }
                    Ok(_) => {
                        log::trace!("Presence: cursor update in room {room_name}");
                    }
                    Err(e) => {
                        log::warn!("Bad awareness payload from peer {}: {e}", msg.client_id);
                        return Ok(Flow::Continue);
                    }
                }
                group.broadcast_raw(msg.client_id, Arc::new(bytes));
            }

            MessageType::RequestContent => match msg.requested_key() {
                Ok(key) => self.seed(&room_name, &key).await?,
                Err(e) => log::warn!("Bad content request from peer {}: {e}", msg.client_id),
            },

            MessageType::Ping => {
                send_message(ws_sender, &SyncMessage::pong(SERVER_CLIENT_ID, &room_name)).await?;
            }

            MessageType::Pong => {}
        }

        Ok(Flow::Continue)
    }

    /// Register the connection in the room its first message names.
    async fn join(&self, session: &mut Session, msg: &SyncMessage) -> bool {
        if msg.client_id == SERVER_CLIENT_ID {
            log::warn!("Rejecting {}: reserved client id", session.addr);
            return false;
        }

        // Joining under the rooms lock keeps a concurrent leave from
        // dropping the room between creation and registration.
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(msg.room.clone())
            .or_insert_with(|| Room::new(self.config.broadcast_capacity));
        let group = room.broadcast.clone();

        if group.peer_count().await >= self.config.max_peers_per_room {
            log::warn!(
                "Rejecting peer {} from {}: room {} is full",
                msg.client_id,
                session.addr,
                msg.room
            );
            drop(rooms);
            self.stats.write().await.rejected_peers += 1;
            return false;
        }

        session.frames = Some(group.add_peer(msg.client_id).await);
        session.client_id = Some(msg.client_id);
        session.room = Some(msg.room.clone());
        session.group = Some(group);
        let room_count = rooms.len();
        drop(rooms);
        self.stats.write().await.active_rooms = room_count;

        log::info!("Peer {} joined room {}", msg.client_id, msg.room);
        true
    }

    /// Seed `key` from the content source if the room has no text for it.
    async fn seed(&self, room_name: &str, key: &DocumentKey) -> ConnectionResult<()> {
        self.stats.write().await.content_requests += 1;

        let present = {
            let rooms = self.rooms.read().await;
            rooms.get(room_name).map(|room| room.has_text(key))
        };
        if present != Some(false) {
            log::debug!("Content for {key} already in room {room_name}");
            return Ok(());
        }

        let content = match self.content.load(key).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                log::warn!("No content available for {key}");
                return Ok(());
            }
            Err(e) => {
                log::error!("Failed to load content for {key}: {e}");
                return Ok(());
            }
        };

        // Another request may have seeded the key while loading
        let seeded = {
            let rooms = self.rooms.read().await;
            rooms.get(room_name).and_then(|room| {
                room.seed_text(key, &content)
                    .map(|update| (update, room.broadcast.clone()))
            })
        };
        if let Some((update, group)) = seeded {
            group.broadcast(&SyncMessage::update(SERVER_CLIENT_ID, room_name, update))?;
            self.stats.write().await.seeded_texts += 1;
            log::info!("Seeded {key} in room {room_name} ({} bytes)", content.len());
        }
        Ok(())
    }

    /// Remove the connection from its room and tell the others it left.
    async fn leave(&self, session: &Session) {
        if let (Some(client_id), Some(room), Some(group)) =
            (session.client_id, &session.room, &session.group)
        {
            group.remove_peer(client_id).await;
            match SyncMessage::awareness(client_id, room, &AwarenessMessage::Leave { client_id }) {
                Ok(leave) => {
                    let _ = group.broadcast(&leave);
                }
                Err(e) => log::warn!("Failed to encode leave for {client_id}: {e}"),
            }
            self.drop_room_if_empty(room).await;
            log::info!("Peer {client_id} left room {room}");
        }

        let room_count = self.rooms.read().await.len();
        let mut s = self.stats.write().await;
        s.active_connections = s.active_connections.saturating_sub(1);
        s.active_rooms = room_count;
    }

    async fn drop_room_if_empty(&self, room: &str) {
        let mut rooms = self.rooms.write().await;
        let empty = match rooms.get(room) {
            Some(r) => r.broadcast.peer_count().await == 0,
            None => false,
        };
        if empty {
            rooms.remove(room);
            log::info!("Room {room} removed (empty)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentSource;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:12345");
        assert_eq!(config.max_peers_per_room, 100);
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.idle_timeout(), Duration::from_secs(90));
        assert!(config.content_root.is_none());
    }

    #[test]
    fn test_server_config_from_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:9000"
            max_peers_per_room = 4
            content_root = "/srv/docs"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.max_peers_per_room, 4);
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.content_root, Some(PathBuf::from("/srv/docs")));

        assert!(ServerConfig::from_toml_str("max_peers_per_room = \"many\"").is_err());
    }

    #[test]
    fn test_server_config_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "heartbeat_interval_secs = 5\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.heartbeat_interval_secs, 5);
        assert!(ServerConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_room_seed_is_idempotent() {
        let room = Room::new(8);
        let key = DocumentKey::from("file:///a.txt");
        assert!(!room.has_text(&key));

        let update = room.seed_text(&key, "first").unwrap();
        assert!(!update.is_empty());
        assert!(room.has_text(&key));
        assert!(room.seed_text(&key, "second").is_none());

        // The seeding update reproduces the text on an empty replica
        let replica = Room::new(8);
        replica.apply_update(&update).unwrap();
        assert!(replica.has_text(&key));
    }

    #[test]
    fn test_room_rejects_garbage_update() {
        let room = Room::new(8);
        assert!(room.apply_update(&[0xFF, 0x00, 0x13]).is_err());
    }

    #[tokio::test]
    async fn test_seed_only_when_room_exists() {
        let content = MemoryContentSource::new();
        content.insert("file:///a.txt", "alpha");
        let server = SyncServer::with_content_source(ServerConfig::default(), Arc::new(content));
        let key = DocumentKey::from("file:///a.txt");

        server.ctx.seed("nowhere", &key).await.unwrap();
        assert_eq!(server.room_count().await, 0);

        server
            .ctx
            .rooms
            .write()
            .await
            .insert("coedit".into(), Room::new(8));
        server.ctx.seed("coedit", &key).await.unwrap();
        server.ctx.seed("coedit", &key).await.unwrap();

        assert_eq!(server.text_content("coedit", &key).await.as_deref(), Some("alpha"));
        let stats = server.stats().await;
        assert_eq!(stats.content_requests, 3);
        assert_eq!(stats.seeded_texts, 1);
    }

    #[tokio::test]
    async fn test_seed_missing_content_leaves_room_untouched() {
        let server = SyncServer::with_content_source(
            ServerConfig::default(),
            Arc::new(MemoryContentSource::new()),
        );
        server
            .ctx
            .rooms
            .write()
            .await
            .insert("coedit".into(), Room::new(8));

        let key = DocumentKey::from("file:///missing.txt");
        server.ctx.seed("coedit", &key).await.unwrap();
        assert_eq!(server.text_content("coedit", &key).await, None);
    }
}
