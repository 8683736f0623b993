//! Local text buffers and the document-model registry.
//!
//! A [`TextModel`] is the editable buffer the local editor subsystem owns.
//! The engine never owns one: it borrows a model through a
//! [`ModelReference`] handed out by a [`ModelProvider`], keeps an `Arc` to
//! the buffer and releases the reference straight away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{CollabError, Result};
use crate::key::DocumentKey;
use crate::lock;

/// Handle returned when registering a listener.
pub type ListenerId = u64;

/// Ordered listener list shared by models and editors.
///
/// Listeners are invoked after the caller has released its own locks, on a
/// snapshot of the list, so a listener may register or remove listeners.
pub(crate) struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn Fn(&E) + Send + Sync>)>>,
}

impl<E> Listeners<E> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub(crate) fn emit(&self, event: &E) {
        let snapshot: Vec<_> = lock(&self.entries)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

/// Where a buffer change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Typed, pasted or otherwise produced by the local user
    Local,
    /// Written by a binding from the replicated text. Never mirrored back.
    Replicated,
}

/// Receives local buffer edits in the same critical section that applies
/// them to the buffer.
///
/// `begin` runs before the buffer is locked. The returned writer must keep
/// the replica exclusively locked until it is dropped, so a replica that
/// applies its own changes into the buffer while locked sees the buffer and
/// the replica move in step.
pub trait ReplicaSink: Send + Sync {
    /// `None` when the replica no longer accepts edits.
    fn begin(&self) -> Option<Box<dyn ReplicaWrite + '_>>;
}

/// An open write into a replica, committed on drop.
pub trait ReplicaWrite {
    fn write(&mut self, edits: &[TextEdit]);
}

fn same_sink(a: &Option<Arc<dyn ReplicaSink>>, b: &Option<Arc<dyn ReplicaSink>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// A single replacement: delete `delete` bytes at `offset`, then insert `insert`.
///
/// Offsets are UTF-8 byte offsets into the text as it is *after* all
/// preceding edits of the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub offset: usize,
    pub delete: usize,
    pub insert: String,
}

impl TextEdit {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            delete: 0,
            insert: text.into(),
        }
    }

    pub fn delete(offset: usize, len: usize) -> Self {
        Self {
            offset,
            delete: len,
            insert: String::new(),
        }
    }

    pub fn replace(offset: usize, delete: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            delete,
            insert: text.into(),
        }
    }

    /// Smallest single edit turning `old` into `new` (common prefix and
    /// suffix are kept). `None` when the strings are equal.
    pub fn between(old: &str, new: &str) -> Option<Self> {
        if old == new {
            return None;
        }
        let mut prefix = old
            .bytes()
            .zip(new.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        while !old.is_char_boundary(prefix) || !new.is_char_boundary(prefix) {
            prefix -= 1;
        }
        let max_suffix = (old.len() - prefix).min(new.len() - prefix);
        let mut suffix = old
            .bytes()
            .rev()
            .zip(new.bytes().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();
        while !old.is_char_boundary(old.len() - suffix) || !new.is_char_boundary(new.len() - suffix) {
            suffix -= 1;
        }
        Some(Self {
            offset: prefix,
            delete: old.len() - prefix - suffix,
            insert: new[prefix..new.len() - suffix].to_string(),
        })
    }

    pub fn is_noop(&self) -> bool {
        self.delete == 0 && self.insert.is_empty()
    }

    /// Map a position in the text before this edit to the text after it.
    ///
    /// Positions inside the deleted range collapse onto the edit offset.
    pub fn map_position(&self, pos: usize) -> usize {
        if pos <= self.offset {
            pos
        } else if pos >= self.offset + self.delete {
            pos - self.delete + self.insert.len()
        } else {
            self.offset
        }
    }

    fn check(&self, text: &str) -> Result<()> {
        let end = self.offset.checked_add(self.delete);
        match end {
            Some(end) if end <= text.len() => {}
            _ => {
                return Err(CollabError::EditOutOfBounds {
                    offset: self.offset,
                    delete: self.delete,
                    len: text.len(),
                })
            }
        }
        if !text.is_char_boundary(self.offset) {
            return Err(CollabError::NotCharBoundary(self.offset));
        }
        if !text.is_char_boundary(self.offset + self.delete) {
            return Err(CollabError::NotCharBoundary(self.offset + self.delete));
        }
        Ok(())
    }
}

/// Notification sent to model listeners after a batch was applied.
#[derive(Debug, Clone)]
pub struct ModelChange {
    pub edits: Vec<TextEdit>,
    pub origin: EditOrigin,
    /// Model version after the batch
    pub version: u64,
}

struct ModelState {
    text: String,
    version: u64,
}

/// An editable local text buffer.
pub struct TextModel {
    key: DocumentKey,
    state: Mutex<ModelState>,
    listeners: Listeners<ModelChange>,
    replica: Mutex<Option<Arc<dyn ReplicaSink>>>,
    disposed: AtomicBool,
}

impl TextModel {
    pub fn new(key: DocumentKey, content: impl Into<String>) -> Self {
        Self {
            key,
            state: Mutex::new(ModelState {
                text: content.into(),
                version: 1,
            }),
            listeners: Listeners::new(),
            replica: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn value(&self) -> String {
        lock(&self.state).text.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        lock(&self.state).version
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark the buffer as gone. Later edits fail with `Unavailable`.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Apply an ordered batch of edits atomically and notify listeners.
    ///
    /// Returns the model version after the batch. An empty batch changes
    /// nothing and notifies nobody.
    pub fn apply_edits(&self, edits: &[TextEdit], origin: EditOrigin) -> Result<u64> {
        self.commit(origin, |_| edits.to_vec())
    }

    /// Replace the whole content, expressed as one minimal edit.
    pub fn set_value(&self, content: &str, origin: EditOrigin) -> Result<u64> {
        self.commit(origin, |current| TextEdit::between(current, content).into_iter().collect())
    }

    /// Build a batch against the current text and apply it under one lock.
    ///
    /// Local batches are written to the attached replica before the replica
    /// is released; listeners run after both locks are gone.
    fn commit<F>(&self, origin: EditOrigin, build: F) -> Result<u64>
    where
        F: Fn(&str) -> Vec<TextEdit>,
    {
        if self.is_disposed() {
            return Err(CollabError::Unavailable {
                key: self.key.clone(),
                what: "text buffer",
            });
        }
        let mut sink: Option<Arc<dyn ReplicaSink>>;
        let (mut writer, change) = loop {
            sink = match origin {
                EditOrigin::Local => lock(&self.replica).clone(),
                EditOrigin::Replicated => None,
            };
            let writer = sink.as_ref().and_then(|sink| sink.begin());

            let mut state = lock(&self.state);
            if origin == EditOrigin::Local && !same_sink(&lock(&self.replica), &sink) {
                // attached or detached while we waited for the replica
                continue;
            }
            let edits: Vec<TextEdit> = build(&state.text)
                .into_iter()
                .filter(|e| !e.is_noop())
                .collect();
            if edits.is_empty() {
                return Ok(state.version);
            }
            if let [edit] = edits.as_slice() {
                edit.check(&state.text)?;
                state
                    .text
                    .replace_range(edit.offset..edit.offset + edit.delete, &edit.insert);
            } else {
                let mut text = state.text.clone();
                for edit in &edits {
                    edit.check(&text)?;
                    text.replace_range(edit.offset..edit.offset + edit.delete, &edit.insert);
                }
                state.text = text;
            }
            state.version += 1;
            let change = ModelChange {
                edits,
                origin,
                version: state.version,
            };
            break (writer, change);
        };

        if let Some(writer) = writer.as_mut() {
            writer.write(&change.edits);
        }
        drop(writer);

        self.listeners.emit(&change);
        Ok(change.version)
    }

    /// Mirror local edits into `sink` from now on. Replaces any earlier sink.
    pub fn attach_replica(&self, sink: Arc<dyn ReplicaSink>) {
        *lock(&self.replica) = Some(sink);
    }

    pub fn detach_replica(&self) -> bool {
        lock(&self.replica).take().is_some()
    }

    pub fn has_replica(&self) -> bool {
        lock(&self.replica).is_some()
    }

    /// Local user insertion.
    pub fn insert(&self, offset: usize, text: &str) -> Result<u64> {
        self.apply_edits(&[TextEdit::insert(offset, text)], EditOrigin::Local)
    }

    /// Local user deletion.
    pub fn delete(&self, offset: usize, len: usize) -> Result<u64> {
        self.apply_edits(&[TextEdit::delete(offset, len)], EditOrigin::Local)
    }

    pub fn on_did_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ModelChange) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for TextModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextModel")
            .field("key", &self.key)
            .field("version", &self.version())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Buffer accessor: resolves a document key to its live buffer.
pub trait ModelProvider: Send + Sync {
    /// A counted reference to the buffer for `key`, if one is open.
    fn model_reference(&self, key: &DocumentKey) -> Option<ModelReference>;
}

/// Borrowed access to a buffer. Dropping it releases the reference.
pub struct ModelReference {
    model: Arc<TextModel>,
    holders: Arc<AtomicUsize>,
}

impl ModelReference {
    pub fn instance(&self) -> &Arc<TextModel> {
        &self.model
    }
}

impl Drop for ModelReference {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::AcqRel);
    }
}

struct RegistryEntry {
    model: Arc<TextModel>,
    holders: Arc<AtomicUsize>,
}

/// In-process document-model registry, the default [`ModelProvider`].
#[derive(Default)]
pub struct DocumentModelRegistry {
    models: Mutex<HashMap<DocumentKey, RegistryEntry>>,
}

impl DocumentModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer for `key`, or return the one already open.
    pub fn create(&self, key: DocumentKey, content: &str) -> Arc<TextModel> {
        let mut models = lock(&self.models);
        models
            .entry(key.clone())
            .or_insert_with(|| RegistryEntry {
                model: Arc::new(TextModel::new(key, content)),
                holders: Arc::new(AtomicUsize::new(0)),
            })
            .model
            .clone()
    }

    /// Close and dispose the buffer for `key`.
    pub fn remove(&self, key: &DocumentKey) -> Option<Arc<TextModel>> {
        let entry = lock(&self.models).remove(key)?;
        entry.model.dispose();
        Some(entry.model)
    }

    pub fn get(&self, key: &DocumentKey) -> Option<Arc<TextModel>> {
        lock(&self.models).get(key).map(|e| e.model.clone())
    }

    /// References handed out and not yet dropped.
    pub fn outstanding_references(&self, key: &DocumentKey) -> usize {
        lock(&self.models)
            .get(key)
            .map_or(0, |e| e.holders.load(Ordering::Acquire))
    }

    pub fn len(&self) -> usize {
        lock(&self.models).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelProvider for DocumentModelRegistry {
    fn model_reference(&self, key: &DocumentKey) -> Option<ModelReference> {
        let models = lock(&self.models);
        let entry = models.get(key)?;
        entry.holders.fetch_add(1, Ordering::AcqRel);
        Some(ModelReference {
            model: entry.model.clone(),
            holders: entry.holders.clone(),
        })
    }
}
