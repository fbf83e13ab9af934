use crate::types::{FileHandle, MediaSource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    File,
    Record,
}

/// Inputs the form layer hands to the core once validation passed.
///
/// A recording is referenced by the transient URI its bytes were published
/// under, so the encoder reads the same bytes the user previewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedInput {
    pub remote_reference: Option<String>,
    pub local_video_file: Option<FileHandle>,
    pub reference_mode: ReferenceMode,
    pub reference_file: Option<FileHandle>,
    pub recording_uri: Option<String>,
}

impl ValidatedInput {
    /// The video slot's source, if exactly one was provided.
    pub fn video_source(&self) -> Option<MediaSource> {
        match (&self.remote_reference, &self.local_video_file) {
            (Some(uri), None) => Some(MediaSource::remote(uri.clone())),
            (None, Some(handle)) => Some(MediaSource::local_file(handle.clone())),
            _ => None,
        }
    }
}
