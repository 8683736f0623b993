//! Websocket transport provider for the collaboration service.
//!
//! Provides:
//! - Connection lifecycle with capped exponential backoff
//! - State-vector handshake and incremental update relay
//! - Awareness relay and heartbeat-driven cursor flushing
//! - Offline queue for messages produced while disconnected
//! - A [`ContentFetcher`] that asks the server to seed documents

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use coedit_core::{
    Awareness, AwarenessMessage, CollabConfig, CollabError, ContentFetcher, DocumentKey, Result,
    Transport, REMOTE_ORIGIN,
};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Sink, SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Origin, ReadTxn, StateVector, Subscription, Transact, Update};

use crate::protocol::{
    send_message, ConnectionResult as SessionResult, MessageType, ProtocolError, SyncMessage,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Provider settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub server_url: String,
    pub room: String,
    pub heartbeat_interval: Duration,
    /// How often throttled awareness is flushed
    pub flush_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub offline_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::from(&CollabConfig::default())
    }
}

impl From<&CollabConfig> for ProviderConfig {
    fn from(config: &CollabConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            room: config.room.clone(),
            heartbeat_interval: Duration::from_secs(10),
            flush_interval: config.cursor_interval().max(Duration::from_millis(10)),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            offline_capacity: 1024,
        }
    }
}

impl ProviderConfig {
    /// Websocket endpoint of the room.
    pub fn url(&self) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), self.room)
    }
}

/// A message waiting for the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Local yrs update (v1)
    Update(Vec<u8>),
    RequestContent(DocumentKey),
}

impl Outbound {
    fn len(&self) -> usize {
        match self {
            Outbound::Update(update) => update.len(),
            Outbound::RequestContent(key) => key.as_str().len(),
        }
    }
}

/// Messages produced while disconnected, replayed on reconnection.
///
/// Dropping updates is safe: the handshake on reconnection resends
/// everything the server lacks. Content requests are not recoverable that
/// way, so a full queue evicts its oldest update to make room for one.
pub struct OfflineQueue {
    queue: VecDeque<Outbound>,
    max_size: usize,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a message. Returns `false` if it was dropped.
    pub fn enqueue(&mut self, item: Outbound) -> bool {
        if self.queue.len() >= self.max_size {
            let evictable = matches!(item, Outbound::RequestContent(_))
                .then(|| {
                    self.queue
                        .iter()
                        .position(|queued| matches!(queued, Outbound::Update(_)))
                })
                .flatten();
            match evictable {
                Some(index) => {
                    self.queue.remove(index);
                }
                None => return false,
            }
        }
        self.queue.push_back(item);
        true
    }

    /// Drain everything in arrival order.
    pub fn drain(&mut self) -> Vec<Outbound> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(Outbound::len).sum()
    }
}

/// [`Transport`] replicating through a [`SyncServer`](crate::server::SyncServer).
///
/// `connect` spawns a connection task on the current tokio runtime; the
/// task reconnects on its own until `disconnect` is called.
pub struct WebsocketProvider {
    config: ProviderConfig,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    /// Owned by whichever connection task is running
    outbound: Arc<Mutex<mpsc::UnboundedReceiver<Outbound>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    update_subscription: Option<Subscription>,
    awareness: Option<Arc<Awareness>>,
}

impl WebsocketProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            outbound_tx,
            outbound: Arc::new(Mutex::new(outbound_rx)),
            state: Arc::new(state),
            shutdown: None,
            task: None,
            update_subscription: None,
            awareness: None,
        }
    }

    /// A fetcher whose requests travel over this provider's connection.
    pub fn content_fetcher(&self) -> ProviderContentFetcher {
        ProviderContentFetcher {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl Transport for WebsocketProvider {
    fn connect(&mut self, doc: &Doc, awareness: Arc<Awareness>) -> Result<()> {
        if self.shutdown.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current()
            .map_err(|e| CollabError::Transport(format!("no tokio runtime: {e}")))?;

        let tx = self.outbound_tx.clone();
        let remote = Origin::from(REMOTE_ORIGIN);
        let subscription = doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&remote) {
                    return;
                }
                let _ = tx.send(Outbound::Update(event.update.clone()));
            })
            .map_err(|e| CollabError::Transport(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection = Connection {
            config: self.config.clone(),
            doc: doc.clone(),
            awareness_rx: Some(awareness.subscribe_outgoing()),
            awareness: awareness.clone(),
            state: self.state.clone(),
            shutdown: shutdown_rx,
            offline: OfflineQueue::new(self.config.offline_capacity),
        };
        let outbound = self.outbound.clone();
        self.task = Some(runtime.spawn(connection.run(outbound)));
        self.shutdown = Some(shutdown_tx);
        self.update_subscription = Some(subscription);
        self.awareness = Some(awareness);
        log::debug!("Websocket provider started for {}", self.config.url());
        Ok(())
    }

    fn disconnect(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        // The task sends `Leave` and closes the socket on its own
        let _ = shutdown.send(true);
        self.task = None;
        self.update_subscription = None;
        if let Some(awareness) = self.awareness.take() {
            awareness.unsubscribe_outgoing();
            awareness.clear_remote();
        }
        log::debug!("Websocket provider stopped for {}", self.config.url());
    }

    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }
}

impl Drop for WebsocketProvider {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Sends content requests through a [`WebsocketProvider`], queued until the
/// provider is connected.
#[derive(Clone)]
pub struct ProviderContentFetcher {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ContentFetcher for ProviderContentFetcher {
    fn request_init_content(&self, key: &DocumentKey) -> BoxFuture<'static, Result<()>> {
        let result = self
            .tx
            .send(Outbound::RequestContent(key.clone()))
            .map_err(|_| CollabError::Fetch {
                key: key.clone(),
                reason: "websocket provider dropped".to_string(),
            });
        futures_util::future::ready(result).boxed()
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
}

/// State owned by the connection task.
struct Connection {
    config: ProviderConfig,
    doc: Doc,
    awareness: Arc<Awareness>,
    awareness_rx: Option<mpsc::UnboundedReceiver<AwarenessMessage>>,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: watch::Receiver<bool>,
    offline: OfflineQueue,
}

impl Connection {
    async fn run(mut self, outbound: Arc<Mutex<mpsc::UnboundedReceiver<Outbound>>>) {
        // A previous task hands the receiver over once it has said goodbye
        let mut outbound = outbound.lock_owned().await;
        let url = self.config.url();
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;

        while !*self.shutdown.borrow() {
            self.state.send_replace(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            attempt += 1;

            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    log::info!("Connected to {url}");
                    backoff = self.config.initial_backoff;
                    self.state.send_replace(ConnectionState::Connected);
                    let (mut sink, stream) = ws.split();
                    let end = self.session(&mut sink, stream, &mut outbound).await;
                    self.awareness.clear_remote();
                    match end {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Lost) => log::warn!("Connection to {url} lost"),
                        Err(e) => log::warn!("Connection to {url} failed: {e}"),
                    }
                }
                Err(e) => log::warn!("Failed to connect to {url} (attempt {attempt}): {e}"),
            }

            self.state.send_replace(ConnectionState::Reconnecting);
            if self.wait(backoff, &mut outbound).await {
                break;
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }

        self.state.send_replace(ConnectionState::Disconnected);
        log::info!("Disconnected from {url}");
    }

    /// Sleep before the next attempt, queueing what arrives meanwhile.
    /// Returns `true` on shutdown.
    async fn wait(&mut self, delay: Duration, outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                _ = self.shutdown.changed() => return true,
                item = outbound.recv() => match item {
                    Some(item) => self.queue(item),
                    None => return true,
                },
                // Presence is resent in full on reconnection
                _ = recv_or_pending(&mut self.awareness_rx) => {}
            }
        }
    }

    fn queue(&mut self, item: Outbound) {
        if !self.offline.enqueue(item) {
            log::debug!(
                "Offline queue full ({} messages); update left to the next handshake",
                self.offline.len()
            );
        }
    }

    async fn session<S, R>(
        &mut self,
        sink: &mut S,
        mut stream: R,
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    ) -> SessionResult<SessionEnd>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
        R: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let client_id = self.awareness.client_id();
        let room = self.config.room.clone();

        let state_vector = self.doc.transact().state_vector().encode_v1();
        send_message(sink, &SyncMessage::sync_step1(client_id, &room, state_vector)).await?;
        for message in self.awareness.local_state_messages() {
            send_message(sink, &SyncMessage::awareness(client_id, &room, &message)?).await?;
        }
        let replay = self.offline.drain();
        if !replay.is_empty() {
            log::debug!("Replaying {} offline messages", replay.len());
        }
        for item in replay {
            self.send_outbound(sink, item).await?;
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        let mut flush = tokio::time::interval(self.config.flush_interval);
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let bytes: Vec<u8> = data.into();
                        match SyncMessage::decode(&bytes) {
                            Ok(msg) => {
                                if msg.msg_type == MessageType::Pong {
                                    last_pong = Instant::now();
                                }
                                self.handle_incoming(sink, msg).await?;
                            }
                            Err(e) => log::warn!("Failed to decode server message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Lost),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },

                item = outbound.recv() => match item {
                    Some(item) => self.send_outbound(sink, item).await?,
                    None => return Ok(SessionEnd::Shutdown),
                },

                message = recv_or_pending(&mut self.awareness_rx) => {
                    send_message(sink, &SyncMessage::awareness(client_id, &room, &message)?).await?;
                }

                _ = flush.tick() => {
                    self.awareness.flush();
                }

                _ = heartbeat.tick() => {
                    if last_pong.elapsed() > self.config.heartbeat_interval * 3 {
                        return Err(ProtocolError::Timeout.into());
                    }
                    send_message(sink, &SyncMessage::ping(client_id, &room)).await?;
                }

                _ = self.shutdown.changed() => {
                    let leave = SyncMessage::awareness(client_id, &room, &self.awareness.leave_message())?;
                    send_message(sink, &leave).await?;
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    async fn handle_incoming<S>(&mut self, sink: &mut S, msg: SyncMessage) -> SessionResult<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        if msg.room != self.config.room {
            log::debug!("Ignoring message for room {}", msg.room);
            return Ok(());
        }
        match msg.msg_type {
            MessageType::SyncStep1 => {
                let diff = match StateVector::decode_v1(&msg.payload) {
                    Ok(sv) => self.doc.transact().encode_diff_v1(&sv),
                    Err(e) => {
                        log::warn!("Bad state vector from server: {e}");
                        return Ok(());
                    }
                };
                let reply = SyncMessage::sync_step2(self.awareness.client_id(), &msg.room, diff);
                send_message(sink, &reply).await?;
            }
            MessageType::SyncStep2 | MessageType::Update => {
                if let Err(e) = apply_remote_update(&self.doc, &msg.payload) {
                    log::warn!("Failed to apply update from {}: {e}", msg.client_id);
                }
            }
            MessageType::Awareness => {
                let message = match msg.awareness_message() {
                    Ok(message) => message,
                    Err(e) => {
                        log::warn!("Bad awareness payload from {}: {e}", msg.client_id);
                        return Ok(());
                    }
                };
                // Newcomers only learn about peers that were already here
                // if those peers introduce themselves
                let introduce = matches!(message, AwarenessMessage::Join { .. })
                    && message.client_id() != self.awareness.client_id()
                    && self.awareness.peer(message.client_id()).is_none();
                self.awareness.apply_remote(&message);
                if introduce {
                    let client_id = self.awareness.client_id();
                    for state in self.awareness.local_state_messages() {
                        let reply = SyncMessage::awareness(client_id, &msg.room, &state)?;
                        send_message(sink, &reply).await?;
                    }
                }
            }
            MessageType::Ping => {
                let pong = SyncMessage::pong(self.awareness.client_id(), &msg.room);
                send_message(sink, &pong).await?;
            }
            MessageType::Pong => {}
            MessageType::RequestContent => {
                log::debug!("Ignoring content request relayed by the server");
            }
        }
        Ok(())
    }

    async fn send_outbound<S>(&mut self, sink: &mut S, item: Outbound) -> SessionResult<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let client_id = self.awareness.client_id();
        let msg = match &item {
            Outbound::Update(update) => SyncMessage::update(client_id, &self.config.room, update.clone()),
            Outbound::RequestContent(key) => {
                log::debug!("Requesting initial content for {key}");
                SyncMessage::request_content(client_id, &self.config.room, key)
            }
        };
        if let Err(e) = send_message(sink, &msg).await {
            self.queue(item);
            return Err(e);
        }
        Ok(())
    }
}

fn apply_remote_update(doc: &Doc, payload: &[u8]) -> std::result::Result<(), String> {
    let update = Update::decode_v1(payload).map_err(|e| e.to_string())?;
    let mut txn = doc.transact_mut_with(REMOTE_ORIGIN);
    txn.apply_update(update).map_err(|e| e.to_string())
}

/// Next message from an optional receiver; pends forever once it closes.
async fn recv_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> T {
    if let Some(receiver) = rx {
        if let Some(value) = receiver.recv().await {
            return value;
        }
    }
    *rx = None;
    std::future::pending().await
}
