use crate::types::MediaSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const STARTING_MESSAGE: &str = "Starting process...";
pub const INTERRUPTED_MESSAGE: &str = "processing interrupted";
pub const CANCELLED_MESSAGE: &str = "processing cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Submitting,
    AwaitingResult,
    Streaming,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitting | JobStatus::AwaitingResult | JobStatus::Streaming
        )
    }

    // A stable label for UI display.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Submitting => "submitting",
            JobStatus::AwaitingResult => "awaiting_result",
            JobStatus::Streaming => "streaming",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Encoding,
    Request,
    Server,
    Stream,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

/// Where the processed media can be played from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultMedia {
    Url {
        url: String,
    },
    Inline {
        mime_type: String,
        #[serde(skip)]
        bytes: Arc<Vec<u8>>,
    },
}

impl ResultMedia {
    /// Source suitable for previewing the output slot.
    pub fn to_source(&self) -> MediaSource {
        match self {
            ResultMedia::Url { url } => MediaSource::remote(url.clone()),
            ResultMedia::Inline { mime_type, bytes } => MediaSource::RecordedBlob {
                bytes: bytes.clone(),
                mime_hint: mime_type.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub media: ResultMedia,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub matching_speakers: Vec<String>,
    #[serde(default)]
    pub speaker_distances: BTreeMap<String, f64>,

    // Full response payload; fields beyond the media reference are opaque.
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub message: String,
    pub percentage: u8,
}

impl ProgressUpdate {
    pub fn is_complete(&self) -> bool {
        self.percentage >= 100
    }
}

/// Client-side record of one remote processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub id: Option<String>,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub status_message: String,
    pub result: Option<JobResult>,
    pub error: Option<ErrorInfo>,
}

impl SubmissionJob {
    pub fn submitting() -> Self {
        Self {
            id: None,
            status: JobStatus::Submitting,
            progress_percent: 0,
            status_message: STARTING_MESSAGE.into(),
            result: None,
            error: None,
        }
    }

    pub fn apply_progress(&mut self, update: &ProgressUpdate) {
        self.progress_percent = update.percentage.min(100);
        if !update.message.is_empty() {
            self.status_message = update.message.clone();
        }
    }

    pub fn succeed(&mut self, result: Option<JobResult>) {
        self.status = JobStatus::Succeeded;
        self.progress_percent = 100;
        self.result = result;
        self.error = None;
    }

    // Progress is kept as-is so the UI can show how far the job got.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        self.status = JobStatus::Failed;
        self.status_message = message.clone();
        self.error = Some(ErrorInfo { kind, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_submitting_at_zero() {
        let job = SubmissionJob::submitting();
        assert_eq!(job.status, JobStatus::Submitting);
        assert_eq!(job.progress_percent, 0);
        assert_eq!(job.status_message, STARTING_MESSAGE);
        assert!(job.status.is_in_flight());
    }

    #[test]
    fn failure_keeps_last_progress() {
        let mut job = SubmissionJob::submitting();
        job.apply_progress(&ProgressUpdate {
            message: "Extracting audio...".into(),
            percentage: 50,
        });
        job.fail(ErrorKind::Stream, INTERRUPTED_MESSAGE);
        assert_eq!(job.progress_percent, 50);
        assert!(job.status.is_terminal());
        assert_eq!(job.error.as_ref().map(|e| e.kind), Some(ErrorKind::Stream));
    }

    #[test]
    fn empty_progress_message_keeps_previous() {
        let mut job = SubmissionJob::submitting();
        job.apply_progress(&ProgressUpdate {
            message: String::new(),
            percentage: 10,
        });
        assert_eq!(job.status_message, STARTING_MESSAGE);
        assert_eq!(job.progress_percent, 10);
    }

    #[test]
    fn inline_result_previews_as_blob() {
        let media = ResultMedia::Inline {
            mime_type: "video/mp4".into(),
            bytes: Arc::new(vec![0, 1]),
        };
        assert!(matches!(media.to_source(), MediaSource::RecordedBlob { .. }));
    }
}
