use crate::mime::{REMOTE_STREAMING_MIME, mime_for_hint, mime_for_name, mime_for_url};
use crate::object_url::{ByteSource, ObjectUrlStore};
use crate::types::{MediaSource, PlaybackDescriptor, Slot};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn remote_platform_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:https?://)?(?:m\.|www\.)?(?:youtu\.be/|youtube\.com/(?:embed/|v/|watch\?v=|watch\?.+&v=))([A-Za-z0-9_-]{11})(?:\S+)?$",
        )
        .expect("valid remote platform regex")
    })
}

/// True for links whose playback is delegated to the hosting platform.
pub fn is_remote_platform_uri(uri: &str) -> bool {
    remote_platform_re().is_match(uri.trim())
}

#[derive(Debug, Clone)]
struct Resolved {
    source: MediaSource,
    descriptor: PlaybackDescriptor,
}

/// Keeps one playback descriptor per slot in sync with the slot's source.
#[derive(Debug, Default)]
pub struct MediaResolver {
    urls: ObjectUrlStore,
    resolved: HashMap<Slot, Resolved>,
}

impl MediaResolver {
    pub fn new(urls: ObjectUrlStore) -> Self {
        Self {
            urls,
            resolved: HashMap::new(),
        }
    }

    pub fn urls(&self) -> &ObjectUrlStore {
        &self.urls
    }

    pub fn descriptor(&self, slot: Slot) -> Option<&PlaybackDescriptor> {
        self.resolved.get(&slot).map(|r| &r.descriptor)
    }

    /// Transient URI currently backing the slot, if its source is local.
    pub fn transient_uri(&self, slot: Slot) -> Option<String> {
        self.urls.uri_for(slot)
    }

    pub fn resolve(
        &mut self,
        source: Option<&MediaSource>,
        slot: Slot,
    ) -> Option<PlaybackDescriptor> {
        let Some(source) = source else {
            self.clear(slot);
            return None;
        };

        if let Some(prev) = self.resolved.get(&slot) {
            let still_backed =
                !needs_transient_uri(&prev.source) || self.urls.is_live(&prev.descriptor.uri);
            if prev.source == *source && still_backed {
                return Some(prev.descriptor.clone());
            }
        }

        let kind = slot.kind();
        let descriptor = match source {
            MediaSource::RemoteReference { uri } => {
                let uri = uri.trim();
                // Remote sources never hold a transient URI.
                self.urls.release(slot);
                if uri.is_empty() {
                    self.resolved.remove(&slot);
                    return None;
                }

                if is_remote_platform_uri(uri) {
                    PlaybackDescriptor {
                        uri: uri.to_string(),
                        mime_type: REMOTE_STREAMING_MIME.into(),
                        kind,
                        is_remote_streaming: true,
                    }
                } else {
                    PlaybackDescriptor {
                        uri: uri.to_string(),
                        mime_type: mime_for_url(uri, kind).into(),
                        kind,
                        is_remote_streaming: false,
                    }
                }
            }
            MediaSource::LocalFile {
                handle,
                declared_name,
            } => {
                let uri = self.urls.acquire(slot, ByteSource::File(handle.clone()));
                PlaybackDescriptor {
                    uri,
                    mime_type: mime_for_name(declared_name, kind).into(),
                    kind,
                    is_remote_streaming: false,
                }
            }
            MediaSource::RecordedBlob { bytes, mime_hint } => {
                let uri = self.urls.acquire(slot, ByteSource::Memory(bytes.clone()));
                PlaybackDescriptor {
                    uri,
                    mime_type: mime_for_hint(mime_hint, kind).into(),
                    kind,
                    is_remote_streaming: false,
                }
            }
        };

        log::debug!(
            "resolved {} slot -> {} ({})",
            slot.as_str(),
            descriptor.uri,
            descriptor.mime_type
        );
        self.resolved.insert(
            slot,
            Resolved {
                source: source.clone(),
                descriptor: descriptor.clone(),
            },
        );
        Some(descriptor)
    }

    /// Drops the slot's source and revokes its transient URI, if any.
    pub fn clear(&mut self, slot: Slot) {
        self.resolved.remove(&slot);
        self.urls.release(slot);
    }

    /// Releases every slot; call when the owning view goes away.
    pub fn teardown(&mut self) {
        self.resolved.clear();
        self.urls.release_all();
    }
}

fn needs_transient_uri(source: &MediaSource) -> bool {
    !matches!(source, MediaSource::RemoteReference { .. })
}
