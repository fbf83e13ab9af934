use crate::endpoints::process_url;
use crate::request::{Body, HttpRequest};
use thiserror::Error;
use voiceclip_core::config::ClientConfig;
use voiceclip_core::input::{ReferenceMode, ValidatedInput};
use voiceclip_core::mime::extension_of;
use voiceclip_core::object_url::{ObjectUrlError, ObjectUrlStore};
use voiceclip_core::types::FileHandle;

pub const FIELD_YOUTUBE_URL: &str = "youtube_url";
pub const FIELD_VIDEO_FILE: &str = "video_file";
pub const FIELD_REFERENCE_AUDIO: &str = "reference_audio";
pub const RECORDED_AUDIO_FILENAME: &str = "recorded_audio.wav";
const RECORDED_AUDIO_MIME: &str = "audio/wav";

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("provide either a YouTube URL or a video file, not both")]
    BothVideoSources,

    #[error("no video source was provided")]
    MissingVideoSource,

    #[error("no reference audio was provided")]
    MissingReferenceAudio,

    #[error("the recorded reference audio is no longer available; record it again")]
    StaleRecording(#[source] ObjectUrlError),

    #[error("failed to read {name}: {source}")]
    ReadFile {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartValue {
    Text(String),
    File {
        filename: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub value: PartValue,
}

/// One `multipart/form-data` submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPayload {
    pub boundary: String,
    pub parts: Vec<Part>,
}

impl Default for MultipartPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartPayload {
    pub fn new() -> Self {
        Self {
            boundary: format!("Boundary-{}", uuid::Uuid::new_v4()),
            parts: Vec::new(),
        }
    }

    pub fn push_text(&mut self, name: &str, value: impl Into<String>) {
        self.parts.push(Part {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
    }

    pub fn push_file(&mut self, name: &str, filename: &str, mime_type: &str, bytes: Vec<u8>) {
        self.parts.push(Part {
            name: name.into(),
            value: PartValue::File {
                filename: filename.into(),
                mime_type: mime_type.into(),
                bytes,
            },
        });
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body: Vec<u8> = Vec::new();
        for part in &self.parts {
            match &part.value {
                PartValue::Text(value) => append_field(&mut body, &self.boundary, &part.name, value),
                PartValue::File {
                    filename,
                    mime_type,
                    bytes,
                } => append_file(
                    &mut body,
                    &self.boundary,
                    &part.name,
                    filename,
                    mime_type,
                    bytes,
                ),
            }
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}

// Type browsers attach to the accepted upload formats.
fn upload_mime(name: &str) -> &'static str {
    match extension_of(name).map(str::to_ascii_lowercase).as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

fn read_file(handle: &FileHandle) -> Result<Vec<u8>, EncodingError> {
    handle.read().map_err(|source| EncodingError::ReadFile {
        name: handle.name.clone(),
        source,
    })
}

/// Turns a validated bundle into the multipart payload the service expects.
///
/// Recordings are read back through `urls`, so a recording whose transient URI
/// was already revoked fails instead of sending stale bytes.
pub fn encode(
    bundle: &ValidatedInput,
    urls: &ObjectUrlStore,
) -> Result<MultipartPayload, EncodingError> {
    let mut payload = MultipartPayload::new();

    match (&bundle.remote_reference, &bundle.local_video_file) {
        (Some(_), Some(_)) => return Err(EncodingError::BothVideoSources),
        (None, None) => return Err(EncodingError::MissingVideoSource),
        (Some(uri), None) => payload.push_text(FIELD_YOUTUBE_URL, uri.trim()),
        (None, Some(video)) => {
            let bytes = read_file(video)?;
            payload.push_file(FIELD_VIDEO_FILE, &video.name, upload_mime(&video.name), bytes);
        }
    }

    match bundle.reference_mode {
        ReferenceMode::File => {
            let reference = bundle
                .reference_file
                .as_ref()
                .ok_or(EncodingError::MissingReferenceAudio)?;
            let bytes = read_file(reference)?;
            payload.push_file(
                FIELD_REFERENCE_AUDIO,
                &reference.name,
                upload_mime(&reference.name),
                bytes,
            );
        }
        ReferenceMode::Record => {
            let uri = bundle
                .recording_uri
                .as_deref()
                .ok_or(EncodingError::MissingReferenceAudio)?;
            let bytes = urls.fetch(uri).map_err(EncodingError::StaleRecording)?;
            payload.push_file(
                FIELD_REFERENCE_AUDIO,
                RECORDED_AUDIO_FILENAME,
                RECORDED_AUDIO_MIME,
                bytes,
            );
        }
    }

    Ok(payload)
}

pub fn build_submission_request(cfg: &ClientConfig, payload: &MultipartPayload) -> HttpRequest {
    HttpRequest {
        method: "POST".into(),
        url: process_url(cfg),
        headers: vec![
            ("Content-Type".into(), payload.content_type()),
            ("Accept".into(), "application/json".into()),
        ],
        body: Body::MultipartFormData {
            boundary: payload.boundary.clone(),
            bytes: payload.to_bytes(),
        },
    }
}

fn append_field(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
    );
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(b"\r\n");
}

fn append_file(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    filename: &str,
    mime_type: &str,
    bytes: &[u8],
) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            name,
            filename.replace('"', "%22")
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
}
