//! End-to-end scenarios: several collaboration services replicating through
//! one in-process hub.

use coedit_core::{
    CollabConfig, CollaborationService, Collaborators, DocumentKey, DocumentModelRegistry, Editor,
    FocusTracker, LoopbackHub, MemoryFetcher, Selection, SlotState, TextModel,
};
use std::sync::Arc;
use std::time::Duration;

const README: &str = "file:///project/README.md";

struct Peer {
    service: CollaborationService,
    registry: Arc<DocumentModelRegistry>,
    focus: Arc<FocusTracker>,
}

impl Peer {
    fn new(hub: &LoopbackHub, fetcher: Arc<MemoryFetcher>, name: &str) -> Self {
        let registry = Arc::new(DocumentModelRegistry::new());
        let focus = Arc::new(FocusTracker::new());
        let config = CollabConfig {
            user_name: name.to_string(),
            cursor_interval_ms: 0,
            ..CollabConfig::default()
        };
        let mut service = CollaborationService::new(
            config,
            Collaborators {
                transport: Box::new(hub.transport()),
                fetcher,
                models: registry.clone(),
                active_editor: focus.clone(),
            },
        );
        service.initialize().unwrap();
        Self {
            service,
            registry,
            focus,
        }
    }

    fn open(&self, key: &str) -> (Arc<TextModel>, Editor) {
        let model = self.registry.create(DocumentKey::from(key), "");
        let editor = Editor::new();
        let bus = self.service.event_bus();
        bus.document_created(key);
        bus.group_opened(key, editor.clone());
        (model, editor)
    }
}

async fn settle(peers: &mut [&mut Peer]) {
    for _ in 0..8 {
        tokio::task::yield_now().await;
        for peer in peers.iter_mut() {
            peer.service.process_pending();
        }
    }
}

#[tokio::test]
async fn test_two_peers_converge() {
    let hub = LoopbackHub::new();
    let fetcher = Arc::new(MemoryFetcher::new(hub.clone()).with_content(README, "# Title\n"));
    let mut alice = Peer::new(&hub, fetcher.clone(), "alice");
    let mut bob = Peer::new(&hub, fetcher.clone(), "bob");

    let (alice_model, _) = alice.open(README);
    let (bob_model, _) = bob.open(README);
    settle(&mut [&mut alice, &mut bob]).await;

    let key = DocumentKey::from(README);
    assert_eq!(alice.service.slot_state(&key), SlotState::Bound);
    assert_eq!(bob.service.slot_state(&key), SlotState::Bound);
    assert_eq!(alice_model.value(), "# Title\n");
    assert_eq!(bob_model.value(), "# Title\n");

    alice_model.insert(8, "alice was here\n").unwrap();
    bob_model.insert(0, "<!-- bob -->\n").unwrap();
    settle(&mut [&mut alice, &mut bob]).await;

    assert_eq!(alice_model.value(), bob_model.value());
    assert_eq!(alice_model.value(), "<!-- bob -->\n# Title\nalice was here\n");
    assert_eq!(hub.text_content(README), Some(alice_model.value()));
}

#[tokio::test]
async fn test_undo_is_scoped_to_the_local_peer() {
    let hub = LoopbackHub::new();
    let fetcher = Arc::new(MemoryFetcher::new(hub.clone()).with_content(README, "base"));
    let mut alice = Peer::new(&hub, fetcher.clone(), "alice");
    let mut bob = Peer::new(&hub, fetcher.clone(), "bob");
    let (alice_model, _) = alice.open(README);
    let (bob_model, _) = bob.open(README);
    settle(&mut [&mut alice, &mut bob]).await;

    alice_model.insert(4, " alice").unwrap();
    bob_model.insert(0, "bob ").unwrap();
    settle(&mut [&mut alice, &mut bob]).await;
    assert_eq!(bob_model.value(), "bob base alice");

    alice.focus.focus(Some(DocumentKey::from(README)));
    assert!(alice.service.undo_on_current_resource());
    settle(&mut [&mut alice, &mut bob]).await;
    assert_eq!(alice_model.value(), "bob base");
    assert_eq!(bob_model.value(), "bob base");
}

#[tokio::test]
async fn test_remote_cursor_is_visible() {
    let hub = LoopbackHub::new();
    let fetcher = Arc::new(MemoryFetcher::new(hub.clone()).with_content(README, "0123456789"));
    let mut alice = Peer::new(&hub, fetcher.clone(), "alice");
    let mut bob = Peer::new(&hub, fetcher.clone(), "bob");
    let (_, alice_editor) = alice.open(README);
    bob.open(README);
    settle(&mut [&mut alice, &mut bob]).await;

    alice_editor.set_selection(Selection::new(2, 5));
    settle(&mut [&mut alice, &mut bob]).await;

    let key = DocumentKey::from(README);
    let cursors = bob.service.binding(&key).unwrap().remote_cursors();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].user_name, "alice");
    assert_eq!(cursors[0].selection, Selection::new(2, 5));

    // Closing the last view withdraws the cursor
    alice.service.event_bus().group_closed(README, alice_editor);
    settle(&mut [&mut alice, &mut bob]).await;
    assert!(bob.service.binding(&key).unwrap().remote_cursors().is_empty());
}

#[tokio::test]
async fn test_destroyed_service_stops_replicating_and_reopen_rebinds() {
    let hub = LoopbackHub::new();
    let fetcher = Arc::new(MemoryFetcher::new(hub.clone()).with_content(README, "v1"));
    let mut alice = Peer::new(&hub, fetcher.clone(), "alice");
    let (model, _) = alice.open(README);
    settle(&mut [&mut alice]).await;

    alice.service.destroy();
    model.insert(2, " local").unwrap();
    assert_eq!(hub.text_content(README).as_deref(), Some("v1"));

    // A fresh service binds to the shared state, which wins over the stale buffer
    let mut again = Peer::new(&hub, fetcher.clone(), "alice");
    let model = again.registry.create(DocumentKey::from(README), "v1 local");
    again.service.event_bus().document_created(README);
    settle(&mut [&mut again]).await;
    assert_eq!(again.service.slot_state(&DocumentKey::from(README)), SlotState::Bound);
    assert_eq!(model.value(), "v1");
    assert!(again.service.stalled_pending(Duration::ZERO).is_empty());
}
