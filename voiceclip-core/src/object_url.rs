use crate::types::{FileHandle, Slot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub const OBJECT_URL_PREFIX: &str = "blob:voiceclip/";

#[derive(Debug, Error)]
pub enum ObjectUrlError {
    #[error("object url is no longer live: {0}")]
    NotLive(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What a transient URI points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSource {
    File(FileHandle),
    Memory(Arc<Vec<u8>>),
}

impl ByteSource {
    fn read(&self) -> Result<Vec<u8>, ObjectUrlError> {
        match self {
            ByteSource::File(handle) => handle.read().map_err(|source| ObjectUrlError::Read {
                path: handle.path.display().to_string(),
                source,
            }),
            ByteSource::Memory(bytes) => Ok(bytes.as_ref().clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UrlStats {
    pub created: u64,
    pub revoked: u64,
    pub live: usize,
}

#[derive(Debug)]
struct Entry {
    uri: String,
    source: ByteSource,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<Slot, Entry>,
    created: u64,
    revoked: u64,
}

/// Owns every transient `blob:` URI backing a local preview.
///
/// At most one URI is live per slot. Clones share the same registry, so the
/// encoder can read back bytes the resolver published.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlStore {
    inner: Arc<Mutex<Inner>>,
}

impl ObjectUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `source` under a fresh URI for `slot`, revoking the slot's
    /// previous URI first.
    pub fn acquire(&self, slot: Slot, source: ByteSource) -> String {
        let mut inner = self.lock();
        if let Some(prev) = inner.slots.remove(&slot) {
            inner.revoked += 1;
            log::debug!("revoked {} for slot {}", prev.uri, slot.as_str());
        }

        let uri = format!("{OBJECT_URL_PREFIX}{}", uuid::Uuid::new_v4());
        inner.slots.insert(
            slot,
            Entry {
                uri: uri.clone(),
                source,
            },
        );
        inner.created += 1;
        log::debug!("created {uri} for slot {}", slot.as_str());
        uri
    }

    /// Revokes the slot's URI. Returns false when nothing was live.
    pub fn release(&self, slot: Slot) -> bool {
        let mut inner = self.lock();
        match inner.slots.remove(&slot) {
            Some(prev) => {
                inner.revoked += 1;
                log::debug!("revoked {} for slot {}", prev.uri, slot.as_str());
                true
            }
            None => false,
        }
    }

    pub fn release_all(&self) {
        let mut inner = self.lock();
        let released = inner.slots.len() as u64;
        inner.slots.clear();
        inner.revoked += released;
    }

    pub fn uri_for(&self, slot: Slot) -> Option<String> {
        self.lock().slots.get(&slot).map(|e| e.uri.clone())
    }

    pub fn is_live(&self, uri: &str) -> bool {
        self.lock().slots.values().any(|e| e.uri == uri)
    }

    /// Reads the bytes behind a live URI.
    pub fn fetch(&self, uri: &str) -> Result<Vec<u8>, ObjectUrlError> {
        let source = self
            .lock()
            .slots
            .values()
            .find(|e| e.uri == uri)
            .map(|e| e.source.clone())
            .ok_or_else(|| ObjectUrlError::NotLive(uri.to_string()))?;

        // Read outside the lock; file-backed sources may be large.
        source.read()
    }

    pub fn stats(&self) -> UrlStats {
        let inner = self.lock();
        UrlStats {
            created: inner.created,
            revoked: inner.revoked,
            live: inner.slots.len(),
        }
    }
}
