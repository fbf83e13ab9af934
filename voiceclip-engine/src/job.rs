use crate::progress::{ProgressSignal, ProgressSubscription};
use crate::traits::{ProcessingService, ServiceResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use voiceclip_core::input::ValidatedInput;
use voiceclip_core::job::{
    CANCELLED_MESSAGE, ErrorKind, INTERRUPTED_MESSAGE, JobResult, JobStatus, SubmissionJob,
};
use voiceclip_core::object_url::ObjectUrlStore;
use voiceclip_providers::parse::{
    ResponseError, interpret_process_response, is_json_content_type, is_success,
};
use voiceclip_providers::submission::{EncodingError, MultipartPayload, encode};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("{0}")]
    Request(String),

    #[error("{0}")]
    Server(String),

    #[error("progress channel failed: {0}")]
    Stream(String),

    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Encoding(_) => ErrorKind::Encoding,
            JobError::Request(_) => ErrorKind::Request,
            JobError::Server(_) => ErrorKind::Server,
            JobError::Stream(_) => ErrorKind::Stream,
            JobError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Message shown to the user. Server messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            JobError::Encoding(e) => e.to_string(),
            JobError::Request(m) | JobError::Server(m) => m.clone(),
            JobError::Stream(_) => INTERRUPTED_MESSAGE.into(),
            JobError::Cancelled => CANCELLED_MESSAGE.into(),
        }
    }
}

impl From<ResponseError> for JobError {
    fn from(e: ResponseError) -> Self {
        match e {
            ResponseError::Server(m) => JobError::Server(m),
            ResponseError::Request(m) => JobError::Request(m),
        }
    }
}

enum Dispatched {
    // Small (JSON or error) responses are read in full before reporting back.
    Complete {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },
    // Headers only; the body is still arriving.
    Pending(ServiceResponse),
}

struct PendingBody {
    task: JoinHandle<anyhow::Result<Vec<u8>>>,
    status: u16,
    content_type: Option<String>,
}

enum Phase {
    Idle,
    Submitting(JoinHandle<anyhow::Result<Dispatched>>),
    AwaitingResult(PendingBody),
    Streaming {
        subscription: ProgressSubscription,
        body: Option<PendingBody>,
        result: Option<JobResult>,
    },
    // Already succeeded on 100% progress; the body can only fill in the result.
    Settling(PendingBody),
    Finished,
}

type Joined<T> = Result<anyhow::Result<T>, JoinError>;

enum Step {
    Dispatched(Joined<Dispatched>),
    Body {
        joined: Joined<Vec<u8>>,
        status: u16,
        content_type: Option<String>,
    },
    LateBody {
        joined: Joined<Vec<u8>>,
        status: u16,
        content_type: Option<String>,
    },
    Signal(Option<ProgressSignal>),
    StreamingBody(Joined<Vec<u8>>),
}

async fn dispatch(
    service: Arc<dyn ProcessingService>,
    payload: MultipartPayload,
) -> anyhow::Result<Dispatched> {
    let mut resp = service.submit(payload).await?;

    let streams = is_success(resp.status)
        && resp
            .progress_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
    if streams {
        return Ok(Dispatched::Pending(resp));
    }

    resp.progress_id = None;
    if !is_success(resp.status) || is_json_content_type(resp.content_type.as_deref()) {
        let body = resp.body.await?;
        return Ok(Dispatched::Complete {
            status: resp.status,
            content_type: resp.content_type,
            body,
        });
    }
    Ok(Dispatched::Pending(resp))
}

/// Drives one remote processing job at a time.
///
/// `start` replaces whatever job was live; `next_update` advances the live
/// job and yields a snapshot after every visible change. `next_update` is
/// cancel safe, so a UI loop can race it against new user actions.
pub struct JobController {
    service: Arc<dyn ProcessingService>,
    urls: ObjectUrlStore,
    job: Option<SubmissionJob>,
    phase: Phase,
}

impl JobController {
    pub fn new(service: Arc<dyn ProcessingService>, urls: ObjectUrlStore) -> Self {
        Self {
            service,
            urls,
            job: None,
            phase: Phase::Idle,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.job
            .as_ref()
            .map(|j| j.status)
            .unwrap_or(JobStatus::Idle)
    }

    pub fn job(&self) -> Option<&SubmissionJob> {
        self.job.as_ref()
    }

    pub fn snapshot(&self) -> Option<SubmissionJob> {
        self.job.clone()
    }

    pub fn has_live_subscription(&self) -> bool {
        matches!(self.phase, Phase::Streaming { .. })
    }

    /// Starts a new job, cancelling any job still in flight first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, input: &ValidatedInput) -> SubmissionJob {
        if self.status().is_in_flight() {
            log::info!("superseding in-flight job ({})", self.status().label());
        }
        self.teardown();

        let job = SubmissionJob::submitting();
        self.job = Some(job.clone());
        log::info!("job: idle -> submitting");

        let payload = match encode(input, &self.urls) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(JobError::Encoding(e));
                return self.current();
            }
        };

        let service = self.service.clone();
        self.phase = Phase::Submitting(tokio::spawn(dispatch(service, payload)));
        job
    }

    /// Stops the live job. Returns the failed snapshot, or `None` when
    /// nothing was in flight.
    pub fn cancel(&mut self) -> Option<SubmissionJob> {
        if !self.status().is_in_flight() {
            self.teardown();
            return None;
        }
        self.fail(JobError::Cancelled);
        self.snapshot()
    }

    /// Advances the live job; `None` once it is terminal and settled (or
    /// there is none). A job that succeeded on 100% progress before its body
    /// arrived yields one more snapshot when the result fills in.
    pub async fn next_update(&mut self) -> Option<SubmissionJob> {
        loop {
            let step = match &mut self.phase {
                Phase::Idle | Phase::Finished => return None,
                Phase::Submitting(task) => Step::Dispatched(task.await),
                Phase::AwaitingResult(body) => Step::Body {
                    joined: (&mut body.task).await,
                    status: body.status,
                    content_type: body.content_type.clone(),
                },
                Phase::Settling(body) => Step::LateBody {
                    joined: (&mut body.task).await,
                    status: body.status,
                    content_type: body.content_type.clone(),
                },
                Phase::Streaming {
                    subscription, body, ..
                } => {
                    tokio::select! {
                        biased;
                        joined = wait_body(body) => Step::StreamingBody(joined),
                        signal = subscription.next() => Step::Signal(signal),
                    }
                }
            };

            if self.apply(step) {
                return self.snapshot();
            }
        }
    }

    /// Drives the live job to a terminal state, reporting every update.
    ///
    /// With `limit`, the job is force-cancelled once the duration elapses.
    pub async fn run_to_completion<F>(
        &mut self,
        limit: Option<Duration>,
        mut on_update: F,
    ) -> Option<SubmissionJob>
    where
        F: FnMut(&SubmissionJob),
    {
        match limit {
            Some(limit) => {
                let drive = Self::drive(self, &mut on_update);
                if tokio::time::timeout(limit, drive).await.is_err() {
                    log::warn!("job exceeded {}s; cancelling", limit.as_secs_f32());
                    if let Some(job) = self.cancel() {
                        on_update(&job);
                    }
                }
            }
            None => Self::drive(self, &mut on_update).await,
        }
        self.snapshot()
    }

    async fn drive<F>(&mut self, on_update: &mut F)
    where
        F: FnMut(&SubmissionJob),
    {
        while let Some(job) = self.next_update().await {
            on_update(&job);
        }
    }

    // Returns true when the job snapshot changed.
    fn apply(&mut self, step: Step) -> bool {
        match step {
            Step::Dispatched(joined) => {
                self.phase = Phase::Idle;
                match flatten(joined) {
                    Err(e) => self.fail(JobError::Request(format!(
                        "could not reach the processing service: {e:#}"
                    ))),
                    Ok(Dispatched::Complete {
                        status,
                        content_type,
                        body,
                    }) => self.finish_with_body(status, content_type.as_deref(), body),
                    Ok(Dispatched::Pending(resp)) => self.on_headers(resp),
                }
                true
            }
            Step::Body {
                joined,
                status,
                content_type,
            } => {
                self.phase = Phase::Idle;
                match flatten(joined) {
                    Ok(body) => self.finish_with_body(status, content_type.as_deref(), body),
                    Err(e) => {
                        self.fail(JobError::Request(format!("failed reading response: {e:#}")))
                    }
                }
                true
            }
            Step::LateBody {
                joined,
                status,
                content_type,
            } => {
                self.phase = Phase::Finished;
                let result = flatten(joined)
                    .map_err(|e| log::warn!("response body failed after completion: {e:#}"))
                    .ok()
                    .and_then(|body| {
                        interpret_process_response(status, content_type.as_deref(), body)
                            .map_err(|e| log::warn!("result after completion is unusable: {e}"))
                            .ok()
                    });
                match (result, self.job.as_mut()) {
                    (Some(result), Some(job)) => {
                        job.result = Some(result);
                        true
                    }
                    _ => false,
                }
            }
            Step::Signal(signal) => {
                match signal {
                    Some(ProgressSignal::Update(update)) => {
                        if let Some(job) = self.job.as_mut() {
                            job.apply_progress(&update);
                        }
                    }
                    Some(ProgressSignal::Completed(update)) => {
                        if let Some(job) = self.job.as_mut() {
                            job.apply_progress(&update);
                        }
                        self.on_progress_complete();
                    }
                    Some(ProgressSignal::Failed(message)) => self.fail(JobError::Stream(message)),
                    None => self.fail(JobError::Stream("progress channel closed".into())),
                }
                true
            }
            Step::StreamingBody(joined) => self.on_streaming_body(joined),
        }
    }

    fn on_headers(&mut self, resp: ServiceResponse) {
        let ServiceResponse {
            status,
            content_type,
            progress_id,
            body,
        } = resp;
        let body = PendingBody {
            task: tokio::spawn(body),
            status,
            content_type,
        };

        match progress_id {
            Some(id) => {
                log::info!("job {id}: submitting -> streaming");
                let stream = self.service.open_progress_channel(&id);
                if let Some(job) = self.job.as_mut() {
                    job.id = Some(id.clone());
                    job.status = JobStatus::Streaming;
                }
                self.phase = Phase::Streaming {
                    subscription: ProgressSubscription::new(id, stream),
                    body: Some(body),
                    result: None,
                };
            }
            None => {
                log::info!("job: submitting -> awaiting_result");
                if let Some(job) = self.job.as_mut() {
                    job.status = JobStatus::AwaitingResult;
                }
                self.phase = Phase::AwaitingResult(body);
            }
        }
    }

    fn on_progress_complete(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Streaming {
                mut subscription,
                body,
                result,
            } => {
                subscription.close();
                match (result, body) {
                    (Some(result), body) => {
                        if let Some(body) = body {
                            body.task.abort();
                        }
                        self.succeed(Some(result));
                    }
                    (None, Some(body)) => {
                        self.succeed(None);
                        self.phase = Phase::Settling(body);
                    }
                    (None, None) => self.succeed(None),
                }
            }
            other => self.phase = other,
        }
    }

    fn on_streaming_body(&mut self, joined: Joined<Vec<u8>>) -> bool {
        let Phase::Streaming { body, result, .. } = &mut self.phase else {
            return false;
        };
        let Some(pending) = body.take() else {
            return false;
        };

        let bytes = match flatten(joined) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("response body failed while streaming: {e:#}");
                return false;
            }
        };

        match interpret_process_response(pending.status, pending.content_type.as_deref(), bytes) {
            Ok(r) => {
                *result = Some(r);
                false
            }
            Err(ResponseError::Server(message)) => {
                self.fail(JobError::Server(message));
                true
            }
            Err(ResponseError::Request(message)) => {
                log::warn!("ignoring unusable response body while streaming: {message}");
                false
            }
        }
    }

    fn finish_with_body(&mut self, status: u16, content_type: Option<&str>, body: Vec<u8>) {
        match interpret_process_response(status, content_type, body) {
            Ok(result) => self.succeed(Some(result)),
            Err(e) => self.fail(e.into()),
        }
    }

    fn succeed(&mut self, result: Option<JobResult>) {
        self.teardown();
        self.phase = Phase::Finished;
        if let Some(job) = self.job.as_mut() {
            log::info!("job: {} -> succeeded", job.status.label());
            job.succeed(result);
        }
    }

    fn fail(&mut self, err: JobError) {
        self.teardown();
        self.phase = Phase::Finished;
        if let Some(job) = self.job.as_mut() {
            log::warn!("job: {} -> failed: {err}", job.status.label());
            job.fail(err.kind(), err.user_message());
        }
    }

    fn current(&self) -> SubmissionJob {
        self.job.clone().unwrap_or_else(SubmissionJob::submitting)
    }

    // Severs everything the live phase owns: the subscription is closed
    // before any task is aborted or a new one opened.
    fn teardown(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Submitting(task) => task.abort(),
            Phase::AwaitingResult(body) | Phase::Settling(body) => body.task.abort(),
            Phase::Streaming {
                mut subscription,
                body,
                ..
            } => {
                subscription.close();
                if let Some(body) = body {
                    body.task.abort();
                }
            }
            Phase::Idle | Phase::Finished => {}
        }
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn wait_body(body: &mut Option<PendingBody>) -> Joined<Vec<u8>> {
    match body {
        Some(pending) => (&mut pending.task).await,
        None => std::future::pending().await,
    }
}

fn flatten<T>(joined: Joined<T>) -> anyhow::Result<T> {
    match joined {
        Ok(inner) => inner,
        Err(e) => Err(anyhow::anyhow!("task failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_kinds_and_messages() {
        assert_eq!(JobError::Server("no speech detected".into()).user_message(), "no speech detected");
        assert_eq!(JobError::Stream("reset".into()).user_message(), INTERRUPTED_MESSAGE);
        assert_eq!(JobError::Stream("reset".into()).kind(), ErrorKind::Stream);
        assert_eq!(JobError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            JobError::from(ResponseError::Request("status 502".into())).kind(),
            ErrorKind::Request
        );
    }
}
