use crate::types::MediaKind;

pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";
pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

// Playback for platform links is delegated to a provider; this is the type the
// player expects for them.
pub const REMOTE_STREAMING_MIME: &str = "video/youtube";

pub fn default_mime(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => DEFAULT_AUDIO_MIME,
        MediaKind::Video => DEFAULT_VIDEO_MIME,
    }
}

/// Maps a file extension to the MIME type a player expects for the given kind.
///
/// Extensions with no entry for the kind (e.g. `flac` in a video slot) fall back
/// to the kind's default container.
pub fn mime_for_extension(ext: Option<&str>, kind: MediaKind) -> &'static str {
    let Some(ext) = ext else {
        return default_mime(kind);
    };
    let ext = ext.trim().to_ascii_lowercase();

    let mapped = match kind {
        MediaKind::Audio => match ext.as_str() {
            "webm" => Some("audio/webm"),
            "ogg" => Some("audio/ogg"),
            "3gp" => Some("audio/3gp"),
            "flac" => Some("audio/flac"),
            "mpeg" => Some("audio/mpeg"),
            _ => None,
        },
        MediaKind::Video => match ext.as_str() {
            "webm" => Some("video/webm"),
            "ogg" | "ogv" => Some("video/ogg"),
            "avi" => Some("video/avi"),
            "3gp" => Some("video/3gp"),
            "mpeg" => Some("video/mpeg"),
            _ => None,
        },
    };

    mapped.unwrap_or_else(|| default_mime(kind))
}

/// Text after the last `.` of the final path segment, if any.
pub fn extension_of(name: &str) -> Option<&str> {
    let last_segment = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = last_segment.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

pub fn mime_for_name(name: &str, kind: MediaKind) -> &'static str {
    mime_for_extension(extension_of(name), kind)
}

/// Infers the playback type of a direct media URL from its path extension.
/// Query string and fragment are not part of the extension.
pub fn mime_for_url(uri: &str, kind: MediaKind) -> &'static str {
    match url::Url::parse(uri) {
        Ok(parsed) => mime_for_name(parsed.path(), kind),
        Err(_) => {
            let path = uri.split(['?', '#']).next().unwrap_or(uri);
            mime_for_name(path, kind)
        }
    }
}

/// Recorder hints look like `audio/webm;codecs=opus`; the subtype is looked up
/// in the extension table.
pub fn mime_for_hint(hint: &str, kind: MediaKind) -> &'static str {
    let essence = hint.split(';').next().unwrap_or_default().trim();
    let subtype = essence.split_once('/').map(|(_, sub)| sub).filter(|s| !s.is_empty());
    mime_for_extension(subtype, kind)
}
