use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// A logical preview slot. Each slot holds at most one active source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Video,
    ReferenceAudio,
    Output,
}

impl Slot {
    pub fn kind(&self) -> MediaKind {
        match self {
            Slot::Video | Slot::Output => MediaKind::Video,
            Slot::ReferenceAudio => MediaKind::Audio,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Video => "video",
            Slot::ReferenceAudio => "reference_audio",
            Slot::Output => "output",
        }
    }
}

/// A file chosen from local storage. Bytes are read on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle {
    pub path: PathBuf,
    pub name: String,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    pub fn size_bytes(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    RemoteReference {
        uri: String,
    },
    LocalFile {
        handle: FileHandle,
        declared_name: String,
    },
    RecordedBlob {
        #[serde(skip)]
        bytes: Arc<Vec<u8>>,
        mime_hint: String,
    },
}

impl MediaSource {
    pub fn remote(uri: impl Into<String>) -> Self {
        MediaSource::RemoteReference { uri: uri.into() }
    }

    pub fn local_file(handle: FileHandle) -> Self {
        let declared_name = handle.name.clone();
        MediaSource::LocalFile {
            handle,
            declared_name,
        }
    }

    pub fn recording(bytes: Vec<u8>, mime_hint: impl Into<String>) -> Self {
        MediaSource::RecordedBlob {
            bytes: Arc::new(bytes),
            mime_hint: mime_hint.into(),
        }
    }
}

/// Renderable description of a source. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackDescriptor {
    pub uri: String,
    pub mime_type: String,
    pub kind: MediaKind,
    pub is_remote_streaming: bool,
}
