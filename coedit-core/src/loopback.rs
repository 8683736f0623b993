//! In-process replication: a hub document standing in for the server, a
//! [`Transport`] that links a service's document to it, and a
//! [`ContentFetcher`] that seeds it from memory.
//!
//! ```text
//!   service A doc ◄──updates──► LoopbackHub doc ◄──updates──► service B doc
//!   awareness A   ◄──messages─────── relay ───────messages──► awareness B
//! ```
//!
//! Useful for embedding several peers in one process and for tests; the
//! websocket provider in `coedit-collab` is the networked equivalent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use yrs::updates::decoder::Decode;
use yrs::{
    Doc, GetString, Map, MapRef, Origin, Out, ReadTxn, Subscription, TextPrelim, TextRef, Transact,
    TransactionMut, Update,
};

use crate::awareness::Awareness;
use crate::collaborators::{ContentFetcher, Transport, REMOTE_ORIGIN, SHARED_TEXTS};
use crate::error::{CollabError, Result};
use crate::key::DocumentKey;
use crate::lock;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

type Peers = Arc<Mutex<Vec<(u64, Arc<Awareness>)>>>;

/// The shared "server" side of an in-process room.
#[derive(Clone)]
pub struct LoopbackHub {
    doc: Doc,
    texts: MapRef,
    peers: Peers,
}

impl LoopbackHub {
    pub fn new() -> Self {
        let doc = Doc::new();
        let texts = doc.get_or_insert_map(SHARED_TEXTS);
        Self {
            doc,
            texts,
            peers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// A fresh, unconnected transport attached to this hub.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            hub: self.clone(),
            id: NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed),
            subscriptions: Vec::new(),
            relay: None,
            awareness: None,
        }
    }

    /// Seed `key` with `content` unless it already has an entry.
    pub fn insert_text(&self, key: &str, content: &str) -> bool {
        let mut txn = self.doc.transact_mut();
        if self.texts.contains_key(&txn, key) {
            return false;
        }
        self.texts.insert(&mut txn, key, TextPrelim::new(content));
        true
    }

    /// Replace the entry for `key` with a new text, as a racing peer would.
    pub fn replace_text(&self, key: &str, content: &str) {
        let mut txn = self.doc.transact_mut();
        self.texts.insert(&mut txn, key, TextPrelim::new(content));
    }

    /// Edit the hub's copy of `key` as a remote peer. Returns false when the
    /// entry is missing.
    pub fn edit_text<F>(&self, key: &str, edit: F) -> bool
    where
        F: FnOnce(&mut TransactionMut, &TextRef),
    {
        let mut txn = self.doc.transact_mut();
        match self.texts.get(&txn, key) {
            Some(Out::YText(text)) => {
                edit(&mut txn, &text);
                true
            }
            _ => false,
        }
    }

    pub fn text_content(&self, key: &str) -> Option<String> {
        let txn = self.doc.transact();
        match self.texts.get(&txn, key) {
            Some(Out::YText(text)) => Some(text.get_string(&txn)),
            _ => None,
        }
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }

    fn others(&self, id: u64) -> Vec<Arc<Awareness>> {
        lock(&self.peers)
            .iter()
            .filter(|(peer_id, _)| *peer_id != id)
            .map(|(_, awareness)| awareness.clone())
            .collect()
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(err: impl std::fmt::Display) -> CollabError {
    CollabError::Transport(err.to_string())
}

fn apply_update(doc: &Doc, update: &[u8], origin: Origin) {
    let update = match Update::decode_v1(update) {
        Ok(update) => update,
        Err(err) => {
            log::warn!("Dropping undecodable loopback update: {err}");
            return;
        }
    };
    let mut txn = doc.transact_mut_with(origin);
    if let Err(err) = txn.apply_update(update) {
        log::warn!("Failed to apply loopback update: {err}");
    }
}

/// Bring `to` up to date with everything `from` has.
fn catch_up(from: &Doc, to: &Doc, origin: Origin) -> Result<()> {
    let state_vector = to.transact().state_vector();
    let diff = from.transact().encode_diff_v1(&state_vector);
    let update = Update::decode_v1(&diff).map_err(transport_error)?;
    let mut txn = to.transact_mut_with(origin);
    txn.apply_update(update).map_err(transport_error)
}

/// [`Transport`] replicating through a [`LoopbackHub`].
pub struct LoopbackTransport {
    hub: LoopbackHub,
    id: u64,
    subscriptions: Vec<Subscription>,
    relay: Option<JoinHandle<()>>,
    awareness: Option<Arc<Awareness>>,
}

impl LoopbackTransport {
    fn start_relay(&mut self, awareness: &Arc<Awareness>) {
        for peer in self.hub.others(self.id) {
            for message in peer.local_state_messages() {
                awareness.apply_remote(&message);
            }
            for message in awareness.local_state_messages() {
                peer.apply_remote(&message);
            }
        }
        lock(&self.hub.peers).push((self.id, awareness.clone()));

        let mut outgoing = awareness.subscribe_outgoing();
        let hub = self.hub.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.relay = Some(handle.spawn(async move {
                    while let Some(message) = outgoing.recv().await {
                        for peer in hub.others(id) {
                            peer.apply_remote(&message);
                        }
                    }
                }));
            }
            Err(_) => log::debug!("No async runtime; awareness relay disabled for peer {id}"),
        }
    }

    fn stop_relay(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
        lock(&self.hub.peers).retain(|(peer_id, _)| *peer_id != self.id);
        if let Some(awareness) = self.awareness.take() {
            awareness.unsubscribe_outgoing();
            let leave = awareness.leave_message();
            for peer in self.hub.others(self.id) {
                peer.apply_remote(&leave);
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, doc: &Doc, awareness: Arc<Awareness>) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let remote = Origin::from(REMOTE_ORIGIN);
        let own = Origin::from(format!("loopback-{}", self.id).as_str());
        catch_up(&self.hub.doc, doc, remote.clone())?;
        catch_up(doc, &self.hub.doc, own.clone())?;

        let client = doc.clone();
        let skip = own.clone();
        let origin = remote.clone();
        let down = self
            .hub
            .doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&skip) {
                    return;
                }
                apply_update(&client, &event.update, origin.clone());
            })
            .map_err(transport_error)?;

        let hub = self.hub.doc.clone();
        let up = doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&remote) {
                    return;
                }
                apply_update(&hub, &event.update, own.clone());
            })
            .map_err(transport_error)?;

        self.subscriptions = vec![down, up];
        self.start_relay(&awareness);
        self.awareness = Some(awareness);
        log::debug!("Loopback peer {} connected", self.id);
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.subscriptions.clear();
        self.stop_relay();
        log::debug!("Loopback peer {} disconnected", self.id);
    }

    fn is_connected(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// [`ContentFetcher`] seeding a [`LoopbackHub`] from an in-memory table.
pub struct MemoryFetcher {
    hub: LoopbackHub,
    contents: Mutex<HashMap<DocumentKey, String>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new(hub: LoopbackHub) -> Self {
        Self {
            hub,
            contents: Mutex::new(HashMap::new()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_content(self, key: &str, content: &str) -> Self {
        self.set_content(key, content);
        self
    }

    pub fn set_content(&self, key: &str, content: &str) {
        lock(&self.contents).insert(DocumentKey::from(key), content.to_string());
    }

    /// How many times initial content was requested.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }
}

impl ContentFetcher for MemoryFetcher {
    fn request_init_content(&self, key: &DocumentKey) -> BoxFuture<'static, Result<()>> {
        self.requests.fetch_add(1, Ordering::AcqRel);
        let content = lock(&self.contents).get(key).cloned();
        let hub = self.hub.clone();
        let key = key.clone();
        async move {
            let content = content.ok_or_else(|| CollabError::Fetch {
                key: key.clone(),
                reason: "no content known".to_string(),
            })?;
            hub.insert_text(key.as_str(), &content);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::Selection;
    use yrs::Text;

    #[test]
    fn test_connect_catches_up_both_ways() {
        let hub = LoopbackHub::new();
        hub.insert_text("file:///a", "from hub");

        let doc = Doc::new();
        let texts = doc.get_or_insert_map(SHARED_TEXTS);
        {
            let mut txn = doc.transact_mut();
            texts.insert(&mut txn, "file:///b", TextPrelim::new("from client"));
        }

        let mut transport = hub.transport();
        transport
            .connect(&doc, Arc::new(Awareness::new(doc.client_id(), "a")))
            .unwrap();
        assert!(transport.is_connected());
        assert_eq!(hub.text_content("file:///b").as_deref(), Some("from client"));
        assert!(texts.contains_key(&doc.transact(), "file:///a"));
    }

    #[test]
    fn test_updates_flow_until_disconnect() {
        let hub = LoopbackHub::new();
        hub.insert_text("file:///a", "abc");
        let doc = Doc::new();
        let mut transport = hub.transport();
        transport
            .connect(&doc, Arc::new(Awareness::new(doc.client_id(), "a")))
            .unwrap();

        assert!(hub.edit_text("file:///a", |txn, text| text.push(txn, "d")));
        let texts = doc.get_or_insert_map(SHARED_TEXTS);
        let content = |doc: &Doc| {
            let txn = doc.transact();
            match texts.get(&txn, "file:///a") {
                Some(Out::YText(text)) => text.get_string(&txn),
                _ => String::new(),
            }
        };
        assert_eq!(content(&doc), "abcd");

        transport.disconnect();
        assert!(!transport.is_connected());
        hub.edit_text("file:///a", |txn, text| text.push(txn, "e"));
        assert_eq!(content(&doc), "abcd");
    }

    #[tokio::test]
    async fn test_awareness_relay() {
        let hub = LoopbackHub::new();
        let (doc_a, doc_b) = (Doc::new(), Doc::new());
        let a = Arc::new(Awareness::with_interval(doc_a.client_id(), "alice", std::time::Duration::ZERO));
        let b = Arc::new(Awareness::with_interval(doc_b.client_id(), "bob", std::time::Duration::ZERO));
        let mut ta = hub.transport();
        let mut tb = hub.transport();
        ta.connect(&doc_a, a.clone()).unwrap();
        tb.connect(&doc_b, b.clone()).unwrap();
        assert_eq!(hub.peer_count(), 2);
        assert_eq!(a.peer(b.client_id()).map(|p| p.user_name), Some("bob".to_string()));

        let key = DocumentKey::from("file:///a");
        a.set_local_cursor(&key, Selection::caret(2));
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let cursors = b.remote_cursors(&key);
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].selection, Selection::caret(2));

        ta.disconnect();
        assert!(b.peer(a.client_id()).is_none());
        assert_eq!(hub.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_fetcher() {
        let hub = LoopbackHub::new();
        let fetcher = MemoryFetcher::new(hub.clone()).with_content("file:///a", "seed");
        fetcher
            .request_init_content(&DocumentKey::from("file:///a"))
            .await
            .unwrap();
        // Idempotent: existing content is left alone
        hub.edit_text("file:///a", |txn, text| text.push(txn, "ed"));
        fetcher
            .request_init_content(&DocumentKey::from("file:///a"))
            .await
            .unwrap();
        assert_eq!(hub.text_content("file:///a").as_deref(), Some("seeded"));

        let missing = fetcher
            .request_init_content(&DocumentKey::from("file:///b"))
            .await;
        assert!(matches!(missing, Err(CollabError::Fetch { .. })));
        assert_eq!(fetcher.requests(), 3);
    }
}
