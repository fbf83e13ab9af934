use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use voiceclip_core::job::{JobResult, ProgressUpdate, ResultMedia};

/// Why a final response could not be turned into a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    // The service's own message, shown verbatim.
    #[error("{0}")]
    Server(String),

    #[error("{0}")]
    Request(String),
}

#[derive(Debug, Error)]
#[error("malformed progress event: {0}")]
pub struct MalformedEventError(String);

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    matching_speakers: Vec<String>,
    #[serde(default)]
    speaker_distances: BTreeMap<String, f64>,
}

pub fn is_success(status: u16) -> bool {
    (200..=299).contains(&status)
}

pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            essence.eq_ignore_ascii_case("application/json") || essence.ends_with("+json")
        })
        .unwrap_or(false)
}

fn is_media_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.trim().to_ascii_lowercase();
            ct.starts_with("video/") || ct.starts_with("audio/") || ct.starts_with("application/octet-stream")
        })
        .unwrap_or(false)
}

/// Interprets the final response of a processing request.
///
/// An `error` field wins regardless of status. A non-2xx status without a
/// readable error message is a request failure.
pub fn interpret_process_response(
    status: u16,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> Result<JobResult, ResponseError> {
    if let Ok(raw) = serde_json::from_slice::<serde_json::Value>(&body) {
        if raw.is_object() {
            return interpret_json(status, raw);
        }
    }

    if !is_success(status) {
        return Err(ResponseError::Request(format!(
            "request failed with status {status}"
        )));
    }

    if is_media_content_type(content_type) {
        let mime_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_string())
            .unwrap_or_default();
        return Ok(JobResult {
            media: ResultMedia::Inline {
                mime_type,
                bytes: Arc::new(body),
            },
            status: None,
            matching_speakers: Vec::new(),
            speaker_distances: BTreeMap::new(),
            raw: serde_json::Value::Null,
        });
    }

    Err(ResponseError::Request(format!(
        "unexpected response from server ({})",
        content_type.unwrap_or("no content type")
    )))
}

fn interpret_json(status: u16, raw: serde_json::Value) -> Result<JobResult, ResponseError> {
    let parsed: ProcessResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        ResponseError::Request(format!("failed to decode response (status {status}): {e}"))
    })?;

    if let Some(message) = parsed.error.filter(|m| !m.trim().is_empty()) {
        return Err(ResponseError::Server(message));
    }

    if !is_success(status) {
        return Err(ResponseError::Request(format!(
            "request failed with status {status}"
        )));
    }

    let url = parsed
        .video_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ResponseError::Request("response did not include a result video".into()))?;

    Ok(JobResult {
        media: ResultMedia::Url { url },
        status: parsed.status,
        matching_speakers: parsed.matching_speakers,
        speaker_distances: parsed.speaker_distances,
        raw,
    })
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    #[serde(default)]
    message: Option<String>,
    percentage: f64,
}

pub fn parse_progress_event(data: &str) -> Result<ProgressUpdate, MalformedEventError> {
    let payload: ProgressPayload =
        serde_json::from_str(data).map_err(|e| MalformedEventError(e.to_string()))?;
    if !payload.percentage.is_finite() {
        return Err(MalformedEventError("percentage is not a number".into()));
    }

    // Floored so only a reported 100 reads as complete.
    Ok(ProgressUpdate {
        message: payload.message.unwrap_or_default(),
        percentage: payload.percentage.clamp(0.0, 100.0).floor() as u8,
    })
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

pub fn parse_ping(body: &[u8]) -> anyhow::Result<String> {
    let resp: MessageResponse = serde_json::from_slice(body).context("decode ping JSON")?;
    if resp.message.is_empty() {
        return Err(anyhow!("empty ping response"));
    }
    Ok(resp.message)
}
