//! Where the server finds a document's initial content.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use coedit_core::{CollabError, DocumentKey, Result};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// Supplies the authoritative content for a document key.
pub trait ContentSource: Send + Sync {
    /// `Ok(None)` when the source has no content for `key`.
    fn load(&self, key: &DocumentKey) -> BoxFuture<'static, Result<Option<String>>>;
}

/// Serves `file://` keys from the local filesystem.
///
/// With a root, key paths are resolved relative to it and may not escape
/// it. Without one, absolute key paths are read as-is.
#[derive(Debug, Clone, Default)]
pub struct FsContentSource {
    root: Option<PathBuf>,
}

impl FsContentSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Map a key to the file it names, if it names one this source serves.
    pub fn resolve(&self, key: &DocumentKey) -> Option<PathBuf> {
        if !key.has_scheme("file") {
            return None;
        }
        let path = Path::new(key.as_str().strip_prefix("file://")?);
        if !path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return None;
        }
        match &self.root {
            Some(root) => Some(root.join(path.strip_prefix("/").ok()?)),
            None => Some(path.to_path_buf()),
        }
    }
}

impl ContentSource for FsContentSource {
    fn load(&self, key: &DocumentKey) -> BoxFuture<'static, Result<Option<String>>> {
        let Some(path) = self.resolve(key) else {
            log::debug!("No file for {key}");
            return futures_util::future::ready(Ok(None)).boxed();
        };
        async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(CollabError::Io(e)),
            }
        }
        .boxed()
    }
}

/// In-memory content, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentSource {
    entries: Arc<Mutex<HashMap<DocumentKey, String>>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<DocumentKey>, content: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), content.into());
    }
}

impl ContentSource for MemoryContentSource {
    fn load(&self, key: &DocumentKey) -> BoxFuture<'static, Result<Option<String>>> {
        let content = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        futures_util::future::ready(Ok(content)).boxed()
    }
}
