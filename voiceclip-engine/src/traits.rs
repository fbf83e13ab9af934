use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use voiceclip_providers::sse::EventStream;
use voiceclip_providers::submission::MultipartPayload;

/// Body of a response whose headers already arrived.
pub type ResponseBody = Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send>>;

pub struct ServiceResponse {
    pub status: u16,
    pub content_type: Option<String>,
    // Present only when the service chose to stream progress.
    pub progress_id: Option<String>,
    pub body: ResponseBody,
}

impl std::fmt::Debug for ServiceResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("progress_id", &self.progress_id)
            .finish_non_exhaustive()
    }
}

impl ServiceResponse {
    /// A response whose body is already in memory.
    pub fn ready(
        status: u16,
        content_type: Option<&str>,
        progress_id: Option<&str>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            progress_id: progress_id.map(str::to_string),
            body: Box::pin(async move { Ok(body) }),
        }
    }
}

#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Dispatches the submission and resolves once response headers arrive.
    /// `Err` means the request could not be dispatched at all.
    async fn submit(&self, payload: MultipartPayload) -> anyhow::Result<ServiceResponse>;

    /// Subscribes to progress for `progress_id`. Returns immediately; connection
    /// problems are reported through the stream.
    fn open_progress_channel(&self, progress_id: &str) -> EventStream;
}
