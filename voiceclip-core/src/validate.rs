use crate::input::{ReferenceMode, ValidatedInput};
use crate::mime::extension_of;
use crate::resolver::is_remote_platform_uri;
use crate::types::FileHandle;
use thiserror::Error;

pub const ALLOWED_AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];
pub const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];
pub const MAX_FILE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Must be a valid YouTube URL.")]
    InvalidRemoteReference,

    #[error("Only mp4, avi, mov, mkv files are allowed.")]
    InvalidVideoExtension,

    #[error("Only wav, mp3 files are allowed.")]
    InvalidAudioExtension,

    #[error("Please provide either YouTube URL or video file, not both")]
    BothVideoSources,

    #[error("Please provide either YouTube URL or a video file")]
    MissingVideoSource,

    #[error("Reference audio file is required")]
    MissingReferenceFile,

    #[error("Record a reference sample first")]
    MissingRecording,

    #[error("{name} is larger than {limit_mb} MB")]
    FileTooLarge { name: String, limit_mb: u64 },

    #[error("cannot read {name}: {reason}")]
    Unreadable { name: String, reason: String },
}

/// Raw form values before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    pub remote_reference: String,
    pub local_video_file: Option<FileHandle>,
    pub reference_mode: ReferenceMode,
    pub reference_file: Option<FileHandle>,
    pub recording_uri: Option<String>,
}

fn has_allowed_extension(name: &str, allowed: &[&str]) -> bool {
    extension_of(name)
        .map(|ext| allowed.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn check_size(handle: &FileHandle) -> Result<(), ValidationError> {
    let size = handle.size_bytes().map_err(|e| ValidationError::Unreadable {
        name: handle.name.clone(),
        reason: e.to_string(),
    })?;
    if size > MAX_FILE_BYTES {
        return Err(ValidationError::FileTooLarge {
            name: handle.name.clone(),
            limit_mb: MAX_FILE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

pub fn validate(raw: RawInput) -> Result<ValidatedInput, ValidationError> {
    let remote = raw.remote_reference.trim();
    if !remote.is_empty() && !is_remote_platform_uri(remote) {
        return Err(ValidationError::InvalidRemoteReference);
    }
    let remote_reference = (!remote.is_empty()).then(|| remote.to_string());

    match (&remote_reference, &raw.local_video_file) {
        (Some(_), Some(_)) => return Err(ValidationError::BothVideoSources),
        (None, None) => return Err(ValidationError::MissingVideoSource),
        _ => {}
    }

    if let Some(video) = &raw.local_video_file {
        if !has_allowed_extension(&video.name, ALLOWED_VIDEO_EXTENSIONS) {
            return Err(ValidationError::InvalidVideoExtension);
        }
        check_size(video)?;
    }

    match raw.reference_mode {
        ReferenceMode::File => {
            let reference = raw
                .reference_file
                .as_ref()
                .ok_or(ValidationError::MissingReferenceFile)?;
            if !has_allowed_extension(&reference.name, ALLOWED_AUDIO_EXTENSIONS) {
                return Err(ValidationError::InvalidAudioExtension);
            }
            check_size(reference)?;
        }
        ReferenceMode::Record => {
            if raw.recording_uri.as_deref().map_or(true, str::is_empty) {
                return Err(ValidationError::MissingRecording);
            }
        }
    }

    Ok(ValidatedInput {
        remote_reference,
        local_video_file: raw.local_video_file,
        reference_mode: raw.reference_mode,
        reference_file: match raw.reference_mode {
            ReferenceMode::File => raw.reference_file,
            ReferenceMode::Record => None,
        },
        recording_uri: match raw.reference_mode {
            ReferenceMode::File => None,
            ReferenceMode::Record => raw.recording_uri,
        },
    })
}
