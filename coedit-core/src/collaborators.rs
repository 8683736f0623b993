//! Capabilities the collaboration service is constructed with.
//!
//! Everything the service talks to besides the CRDT is passed in
//! explicitly, so tests can substitute each one.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use yrs::Doc;

use crate::awareness::Awareness;
use crate::error::Result;
use crate::key::DocumentKey;
use crate::lock;
use crate::model::ModelProvider;

/// Origin attached to transactions that apply updates received from peers.
pub const REMOTE_ORIGIN: &str = "remote";

/// Name of the root map holding one replicated text per document key.
pub const SHARED_TEXTS: &str = "texts";

/// Replicates the shared document with remote peers.
pub trait Transport: Send {
    /// Start replicating `doc` and `awareness`. Must not block; connection
    /// failures are handled (and retried) by the transport itself.
    fn connect(&mut self, doc: &Doc, awareness: Arc<Awareness>) -> Result<()>;

    /// Stop replicating. Safe to call when not connected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Asks a server-side peer to populate the shared map with a document's
/// authoritative content.
///
/// Idempotent from the caller's side: requesting content that already
/// exists is harmless. Completion is observed through the shared map, not
/// through the returned future.
pub trait ContentFetcher: Send + Sync {
    fn request_init_content(&self, key: &DocumentKey) -> BoxFuture<'static, Result<()>>;
}

/// Reports which document the focused editor shows.
pub trait ActiveEditor: Send + Sync {
    fn current_resource(&self) -> Option<DocumentKey>;
}

/// `ActiveEditor` backed by a value the host updates on focus changes.
#[derive(Debug, Default)]
pub struct FocusTracker {
    current: Mutex<Option<DocumentKey>>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self, key: Option<DocumentKey>) {
        *lock(&self.current) = key;
    }
}

impl ActiveEditor for FocusTracker {
    fn current_resource(&self) -> Option<DocumentKey> {
        lock(&self.current).clone()
    }
}

/// The service's external collaborators.
pub struct Collaborators {
    pub transport: Box<dyn Transport>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub models: Arc<dyn ModelProvider>,
    pub active_editor: Arc<dyn ActiveEditor>,
}
