//! # coedit-core — Collaborative text-editing synchronization engine
//!
//! Keeps local editor buffers consistent with replicated yrs texts while
//! documents, editor views and remote content come and go in any order.
//!
//! ## Architecture
//!
//! ```text
//!  editor subsystem                 CollaborationService
//!  ────────────────                 ────────────────────
//!  DocumentCreated ─┐        ┌──► Binding ◄──► TextRef ("texts" map)
//!  DocumentRemoved ─┤  queue │       │                │
//!  GroupOpened ─────┼───────►┤       ▼                ▼
//!  GroupClosed ─────┘        │   TextModel       Transport ◄──► peers
//!                            │   + Editors
//!                            └──► PendingBindingRequest ──► ContentFetcher
//! ```
//!
//! ## Modules
//!
//! - [`service`] — per-key lifecycle orchestration
//! - [`binding`] — buffer ↔ replicated text synchronization
//! - [`state`] — pure per-key state machine
//! - [`events`] — lifecycle events and the service queue
//! - [`model`] / [`editor`] — local buffers and editor views
//! - [`awareness`] — cursor and presence channel
//! - [`collaborators`] — transport, fetcher and focus capabilities
//! - [`loopback`] — in-process transport and fetcher

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod awareness;
pub mod binding;
pub mod collaborators;
pub mod config;
pub mod editor;
pub mod error;
pub mod events;
pub mod key;
pub mod loopback;
pub mod model;
pub mod service;
pub mod state;

pub use awareness::{Awareness, AwarenessMessage, ClientId, CursorColor, RemoteCursor, RemotePeer};
pub use binding::Binding;
pub use collaborators::{
    ActiveEditor, Collaborators, ContentFetcher, FocusTracker, Transport, REMOTE_ORIGIN, SHARED_TEXTS,
};
pub use config::CollabConfig;
pub use editor::{Editor, EditorId, Selection};
pub use error::{CollabError, Result};
pub use events::{EditorEvent, EventBus, EventKind, MapAction, ServiceEvent};
pub use key::DocumentKey;
pub use loopback::{LoopbackHub, LoopbackTransport, MemoryFetcher};
pub use model::{
    DocumentModelRegistry, EditOrigin, ListenerId, ModelChange, ModelProvider, ModelReference,
    ReplicaSink, ReplicaWrite, TextEdit, TextModel,
};
pub use service::{CollaborationService, PendingBindingRequest};
pub use state::{transition, Action, IgnoreReason, SlotState, Transition, Trigger};

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
