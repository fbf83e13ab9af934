use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use voiceclip_core::config::ClientConfig;
use voiceclip_core::object_url::ObjectUrlStore;
use voiceclip_engine::job::JobController;
use voiceclip_engine::traits::{ProcessingService, ServiceResponse};
use voiceclip_providers::endpoints::{ping_url, stream_url};
use voiceclip_providers::parse::{is_success, parse_ping};
use voiceclip_providers::request::HttpRequest;
use voiceclip_providers::runtime;
use voiceclip_providers::sse::{EventStream, open_event_stream};
use voiceclip_providers::submission::{MultipartPayload, build_submission_request};

/// The processing service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProcessingService {
    cfg: ClientConfig,
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl HttpProcessingService {
    pub fn new(cfg: ClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: runtime::build_client(&cfg)?,
            stream_client: runtime::build_stream_client(&cfg)?,
            cfg,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    /// Health check; returns the service's reply message.
    pub async fn ping(&self) -> anyhow::Result<String> {
        let resp = runtime::execute(&self.client, &HttpRequest::get(ping_url(&self.cfg))).await?;
        if !is_success(resp.status) {
            return Err(anyhow!("ping failed with status {}", resp.status));
        }
        parse_ping(&resp.body)
    }
}

#[async_trait]
impl ProcessingService for HttpProcessingService {
    async fn submit(&self, payload: MultipartPayload) -> anyhow::Result<ServiceResponse> {
        let req = build_submission_request(&self.cfg, &payload);
        log::info!(
            "submitting [{}] to {}",
            payload.field_names().join(", "),
            req.url
        );

        let resp = runtime::send(&self.client, &req).await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let progress_id = resp
            .headers()
            .get(self.cfg.progress_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        log::debug!("submission answered {status}, progress id {progress_id:?}");

        Ok(ServiceResponse {
            status,
            content_type,
            progress_id,
            body: Box::pin(async move {
                let bytes = resp.bytes().await.context("failed reading response body")?;
                Ok(bytes.to_vec())
            }),
        })
    }

    fn open_progress_channel(&self, progress_id: &str) -> EventStream {
        match stream_url(&self.cfg, progress_id) {
            Ok(url) => open_event_stream(self.stream_client.clone(), url),
            Err(e) => EventStream::failed(format!("{e:#}")),
        }
    }
}

/// Wires a controller to the HTTP service described by `cfg`.
pub fn build_controller(cfg: ClientConfig, urls: ObjectUrlStore) -> anyhow::Result<JobController> {
    let service = HttpProcessingService::new(cfg)?;
    Ok(JobController::new(Arc::new(service), urls))
}
