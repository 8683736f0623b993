//! The collaboration service: lifecycle orchestration for every document key.
//!
//! ## Architecture
//!
//! ```text
//!  editor subsystem ──► EventBus ──┐
//!                                  ├──► queue ──► dispatch ──► handler table
//!  "texts" map observer ───────────┘                              │
//!                                                                 ▼
//!                                               transition(state, trigger)
//!                                                                 │
//!                              ┌──────────────────┬───────────────┴──────┐
//!                              ▼                  ▼                      ▼
//!                           Binding        PendingBindingRequest   ContentFetcher
//! ```
//!
//! Every transition runs on the one queue the host drains with
//! [`CollaborationService::process_pending`] or
//! [`CollaborationService::process_next`], so two events for the same key
//! never interleave. The initial-content request is the only asynchronous
//! step; its result comes back as an ordinary shared-map notification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use yrs::types::EntryChange;
use yrs::{Doc, Map, MapRef, Observable, Out, Subscription, TextRef, Transact};

use crate::awareness::Awareness;
use crate::binding::Binding;
use crate::collaborators::{ActiveEditor, Collaborators, ContentFetcher, Transport, SHARED_TEXTS};
use crate::config::CollabConfig;
use crate::editor::{Editor, EditorId};
use crate::error::{CollabError, Result};
use crate::events::{EditorEvent, EventBus, EventKind, MapAction, ServiceEvent};
use crate::key::DocumentKey;
use crate::model::{ModelProvider, TextModel};
use crate::state::{transition, Action, IgnoreReason, SlotState, Trigger};

type Handler = fn(&mut CollaborationService, ServiceEvent);

/// Bind intent waiting for its replicated text to arrive.
#[derive(Debug)]
pub struct PendingBindingRequest {
    key: DocumentKey,
    model: Arc<TextModel>,
    editors: Vec<Editor>,
    requested_at: Instant,
}

impl PendingBindingRequest {
    fn new(key: DocumentKey, model: Arc<TextModel>) -> Self {
        Self {
            key,
            model,
            editors: Vec::new(),
            requested_at: Instant::now(),
        }
    }

    fn queue(&mut self, editor: Editor) {
        if !self.editors.contains(&editor) {
            self.editors.push(editor);
        }
    }

    fn unqueue(&mut self, editor: &Editor) {
        self.editors.retain(|e| e != editor);
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn model(&self) -> &Arc<TextModel> {
        &self.model
    }

    /// Editors that will be attached once the binding exists.
    pub fn editors(&self) -> &[Editor] {
        &self.editors
    }

    pub fn waited(&self) -> Duration {
        self.requested_at.elapsed()
    }
}

pub struct CollaborationService {
    config: CollabConfig,
    doc: Doc,
    texts: MapRef,
    awareness: Arc<Awareness>,

    transport: Box<dyn Transport>,
    fetcher: Arc<dyn ContentFetcher>,
    models: Arc<dyn ModelProvider>,
    active_editor: Arc<dyn ActiveEditor>,

    bindings: HashMap<DocumentKey, Binding>,
    pending: HashMap<DocumentKey, PendingBindingRequest>,
    /// Which key each known editor is attached to or queued for
    editor_slots: HashMap<EditorId, DocumentKey>,

    handlers: HashMap<EventKind, Handler>,
    map_subscription: Option<Subscription>,
    tx: mpsc::UnboundedSender<ServiceEvent>,
    rx: mpsc::UnboundedReceiver<ServiceEvent>,
    initialized: bool,
}

impl CollaborationService {
    pub fn new(config: CollabConfig, collaborators: Collaborators) -> Self {
        let doc = Doc::new();
        let texts = doc.get_or_insert_map(SHARED_TEXTS);
        let awareness = Arc::new(Awareness::with_interval(
            doc.client_id(),
            config.user_name.clone(),
            config.cursor_interval(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            config,
            doc,
            texts,
            awareness,
            transport: collaborators.transport,
            fetcher: collaborators.fetcher,
            models: collaborators.models,
            active_editor: collaborators.active_editor,
            bindings: HashMap::new(),
            pending: HashMap::new(),
            editor_slots: HashMap::new(),
            handlers: Self::subscription_table(),
            map_subscription: None,
            tx,
            rx,
            initialized: false,
        }
    }

    fn subscription_table() -> HashMap<EventKind, Handler> {
        let mut table: HashMap<EventKind, Handler> = HashMap::new();
        table.insert(EventKind::DocumentCreated, Self::on_document_created);
        table.insert(EventKind::DocumentRemoved, Self::on_document_removed);
        table.insert(EventKind::GroupOpened, Self::on_group_opened);
        table.insert(EventKind::GroupClosed, Self::on_group_closed);
        table.insert(EventKind::SharedMapChanged, Self::on_shared_map_changed);
        table
    }

    // ───────────────────────────────────────────────────────────────
    // Lifecycle
    // ───────────────────────────────────────────────────────────────

    /// Subscribe to the shared map and open the transport connection.
    ///
    /// Must be called inside a tokio runtime when the transport needs one.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let tx = self.tx.clone();
        let subscription = self.texts.observe(move |txn, event| {
            for (key, change) in event.keys(txn).iter() {
                let action = match change {
                    EntryChange::Inserted(_) | EntryChange::Updated(_, _) => MapAction::Added,
                    EntryChange::Removed(_) => MapAction::Deleted,
                };
                let event = ServiceEvent::SharedMap {
                    key: DocumentKey::new(key.to_string()),
                    action,
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
        });
        self.map_subscription = Some(subscription);

        if let Err(err) = self.transport.connect(&self.doc, self.awareness.clone()) {
            self.map_subscription = None;
            return Err(err);
        }
        self.initialized = true;
        log::info!(
            "Collaboration service started (room '{}', client {})",
            self.config.room,
            self.doc.client_id()
        );
        Ok(())
    }

    /// Unsubscribe, disconnect and dispose every binding. Pending requests
    /// are dropped.
    pub fn destroy(&mut self) {
        self.map_subscription = None;
        self.transport.disconnect();
        for (_, mut binding) in self.bindings.drain() {
            binding.dispose();
        }
        self.pending.clear();
        self.editor_slots.clear();
        self.handlers.clear();
        if self.initialized {
            log::info!("Collaboration service stopped");
        }
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    // ───────────────────────────────────────────────────────────────
    // Event queue
    // ───────────────────────────────────────────────────────────────

    /// Handle for producers of editor lifecycle events.
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.tx.clone())
    }

    /// Drain every queued event. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event and handle it.
    pub async fn process_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Run one event through the subscription table.
    pub fn dispatch(&mut self, event: ServiceEvent) {
        if !event.key().has_scheme(&self.config.tracked_scheme) {
            log::trace!("Ignoring {:?} for untracked scheme: {}", event.kind(), event.key());
            return;
        }
        match self.handlers.get(&event.kind()).copied() {
            Some(handler) => handler(self, event),
            None => log::debug!("No handler for {:?}; service destroyed", event.kind()),
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Handlers
    // ───────────────────────────────────────────────────────────────

    fn on_document_created(&mut self, event: ServiceEvent) {
        let ServiceEvent::Editor(EditorEvent::DocumentCreated { key }) = event else {
            return;
        };
        let text = self.shared_text(&key);
        let step = transition(
            self.slot_state(&key),
            Trigger::DocumentCreated {
                text_available: text.is_some(),
            },
        );
        if let Action::Ignore(reason) = step.action {
            return Self::log_ignored(&key, "document created", reason);
        }

        let Some(model) = self.acquire_model(&key) else {
            let err = CollabError::Unavailable {
                key,
                what: "text buffer",
            };
            log::warn!("Skipping document creation: {err}");
            return;
        };
        match (step.action, text) {
            (Action::Bind, Some(text)) => self.bind(key, text, model, Vec::new()),
            _ => self.request_content(key, model),
        }
    }

    fn on_shared_map_changed(&mut self, event: ServiceEvent) {
        let ServiceEvent::SharedMap { key, action } = event else {
            return;
        };
        let trigger = match action {
            MapAction::Added => Trigger::SharedTextAdded,
            MapAction::Deleted => Trigger::SharedTextDeleted,
        };
        let step = transition(self.slot_state(&key), trigger);
        match step.action {
            Action::ResolvePending => {
                // Deleted again before the notification was handled
                let Some(text) = self.shared_text(&key) else {
                    log::debug!("Shared text for {key} vanished; request stays pending");
                    return;
                };
                if let Some(request) = self.pending.remove(&key) {
                    log::debug!("Content for {key} arrived after {:?}", request.waited());
                    self.bind(key, text, request.model, request.editors);
                }
            }
            Action::Retarget => {
                if let (Some(text), Some(binding)) = (self.shared_text(&key), self.bindings.get_mut(&key)) {
                    binding.change_text(text);
                }
            }
            Action::Ignore(reason) => Self::log_ignored(&key, "shared map change", reason),
            _ => {}
        }
    }

    fn on_group_opened(&mut self, event: ServiceEvent) {
        let ServiceEvent::Editor(EditorEvent::GroupOpened { key, editor }) = event else {
            return;
        };
        let step = transition(self.slot_state(&key), Trigger::GroupOpened);
        match step.action {
            Action::AttachEditor => {
                self.release_editor_elsewhere(&editor, &key);
                if let Some(binding) = self.bindings.get_mut(&key) {
                    binding.add_editor(editor.clone());
                    self.editor_slots.insert(editor.id(), key);
                }
            }
            Action::QueueEditor => {
                self.release_editor_elsewhere(&editor, &key);
                if let Some(request) = self.pending.get_mut(&key) {
                    request.queue(editor.clone());
                    self.editor_slots.insert(editor.id(), key);
                }
            }
            Action::Ignore(reason) => Self::log_ignored(&key, "group opened", reason),
            _ => {}
        }
    }

    fn on_group_closed(&mut self, event: ServiceEvent) {
        let ServiceEvent::Editor(EditorEvent::GroupClosed { key, editor }) = event else {
            return;
        };
        let step = transition(self.slot_state(&key), Trigger::GroupClosed);
        match step.action {
            Action::DetachEditor => {
                if let Some(binding) = self.bindings.get_mut(&key) {
                    binding.remove_editor(&editor);
                }
                if self.editor_slots.get(&editor.id()) == Some(&key) {
                    self.editor_slots.remove(&editor.id());
                }
            }
            Action::Ignore(reason) => Self::log_ignored(&key, "group closed", reason),
            _ => {}
        }
    }

    fn on_document_removed(&mut self, event: ServiceEvent) {
        let ServiceEvent::Editor(EditorEvent::DocumentRemoved { key }) = event else {
            return;
        };
        let step = transition(self.slot_state(&key), Trigger::DocumentRemoved);
        match step.action {
            Action::Release => {
                if let Some(mut binding) = self.bindings.remove(&key) {
                    binding.dispose();
                }
                log::debug!("Released binding for {key}");
            }
            Action::CancelPending => {
                self.pending.remove(&key);
                log::debug!("Cancelled pending request for {key}");
            }
            Action::Ignore(reason) => return Self::log_ignored(&key, "document removed", reason),
            _ => {}
        }
        self.editor_slots.retain(|_, slot| *slot != key);
    }

    fn log_ignored(key: &DocumentKey, what: &str, reason: IgnoreReason) {
        match reason {
            IgnoreReason::OutOfOrder => {
                let err = CollabError::OutOfOrder {
                    key: key.clone(),
                    detail: format!("{what} before the document was created"),
                };
                log::warn!("{err}");
            }
            _ => log::debug!("Ignoring {what} for {key}: {reason:?}"),
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Side effects
    // ───────────────────────────────────────────────────────────────

    /// Borrow the live buffer and give the reference back right away.
    fn acquire_model(&self, key: &DocumentKey) -> Option<Arc<TextModel>> {
        let reference = self.models.model_reference(key)?;
        let model = reference.instance().clone();
        drop(reference);
        Some(model)
    }

    fn shared_text(&self, key: &DocumentKey) -> Option<TextRef> {
        let txn = self.doc.transact();
        match self.texts.get(&txn, key.as_str()) {
            Some(Out::YText(text)) => Some(text),
            Some(_) => {
                log::warn!("Shared entry for {key} is not a text");
                None
            }
            None => None,
        }
    }

    fn bind(&mut self, key: DocumentKey, text: TextRef, model: Arc<TextModel>, editors: Vec<Editor>) {
        match Binding::new(key.clone(), self.doc.clone(), text, model, self.awareness.clone()) {
            Ok(mut binding) => {
                for editor in editors {
                    binding.add_editor(editor);
                }
                log::info!("Bound {key} ({} editors)", binding.editor_count());
                self.bindings.insert(key, binding);
            }
            Err(err) => {
                log::warn!("Could not bind {key}: {err}");
                for editor in &editors {
                    self.editor_slots.remove(&editor.id());
                }
            }
        }
    }

    fn request_content(&mut self, key: DocumentKey, model: Arc<TextModel>) {
        self.pending
            .insert(key.clone(), PendingBindingRequest::new(key.clone(), model));
        log::debug!("No shared text for {key}; requesting initial content");

        let request = self.fetcher.request_init_content(&key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = request.await {
                        log::warn!("{err}");
                    }
                });
            }
            Err(_) => log::warn!("No async runtime; initial content for {key} was not requested"),
        }
    }

    /// Keep an editor in a single slot: opening it elsewhere detaches it
    /// from its previous binding or pending request.
    fn release_editor_elsewhere(&mut self, editor: &Editor, key: &DocumentKey) {
        let Some(previous) = self.editor_slots.get(&editor.id()).cloned() else {
            return;
        };
        if previous == *key {
            return;
        }
        if let Some(binding) = self.bindings.get_mut(&previous) {
            binding.remove_editor(editor);
        }
        if let Some(request) = self.pending.get_mut(&previous) {
            request.unqueue(editor);
        }
        self.editor_slots.remove(&editor.id());
        log::debug!("Editor {} moved from {previous} to {key}", editor.id());
    }

    // ───────────────────────────────────────────────────────────────
    // Undo / redo
    // ───────────────────────────────────────────────────────────────

    /// Undo on the focused document. No-op when it is not bound.
    pub fn undo_on_current_resource(&mut self) -> bool {
        let Some(key) = self.active_editor.current_resource() else {
            return false;
        };
        self.bindings.get_mut(&key).is_some_and(|binding| binding.undo())
    }

    pub fn redo_on_current_resource(&mut self) -> bool {
        let Some(key) = self.active_editor.current_resource() else {
            return false;
        };
        self.bindings.get_mut(&key).is_some_and(|binding| binding.redo())
    }

    // ───────────────────────────────────────────────────────────────
    // Introspection
    // ───────────────────────────────────────────────────────────────

    /// Keys that have waited in `Pending` for at least `threshold`.
    /// Each one is logged so the condition can be surfaced.
    pub fn stalled_pending(&self, threshold: Duration) -> Vec<DocumentKey> {
        let mut stalled: Vec<DocumentKey> = self
            .pending
            .values()
            .filter(|request| request.waited() >= threshold)
            .map(|request| request.key.clone())
            .collect();
        stalled.sort();
        for key in &stalled {
            log::warn!("Still waiting for initial content of {key}");
        }
        stalled
    }

    /// [`Self::stalled_pending`] with the configured threshold, if any.
    pub fn check_stalled(&self) -> Vec<DocumentKey> {
        self.config
            .pending_warn_after()
            .map(|threshold| self.stalled_pending(threshold))
            .unwrap_or_default()
    }

    pub fn slot_state(&self, key: &DocumentKey) -> SlotState {
        if self.bindings.contains_key(key) {
            SlotState::Bound
        } else if self.pending.contains_key(key) {
            SlotState::Pending
        } else {
            SlotState::Untracked
        }
    }

    pub fn binding(&self, key: &DocumentKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    pub fn binding_mut(&mut self, key: &DocumentKey) -> Option<&mut Binding> {
        self.bindings.get_mut(key)
    }

    pub fn pending_request(&self, key: &DocumentKey) -> Option<&PendingBindingRequest> {
        self.pending.get(key)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn shared_doc(&self) -> &Doc {
        &self.doc
    }

    pub fn shared_texts(&self) -> &MapRef {
        &self.texts
    }

    pub fn awareness(&self) -> &Arc<Awareness> {
        &self.awareness
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }
}

impl Drop for CollaborationService {
    fn drop(&mut self) {
        if self.initialized {
            self.destroy();
        }
    }
}
