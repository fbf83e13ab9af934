use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use voiceclip_core::input::{ReferenceMode, ValidatedInput};
use voiceclip_core::job::{
    CANCELLED_MESSAGE, ErrorKind, INTERRUPTED_MESSAGE, JobStatus, ResultMedia,
};
use voiceclip_core::object_url::{ByteSource, ObjectUrlStore};
use voiceclip_core::types::{FileHandle, Slot};
use voiceclip_engine::job::JobController;
use voiceclip_engine::traits::{ProcessingService, ServiceResponse};
use voiceclip_providers::sse::{EventStream, SseEvent, StreamFrame};
use voiceclip_providers::submission::MultipartPayload;

const RESULT_JSON: &str = r#"{"status":"success","video_url":"https://bucket.example/processed_videos/out.mp4","matching_speakers":["SPEAKER_01"],"speaker_distances":{"SPEAKER_00":0.81,"SPEAKER_01":0.05}}"#;

#[derive(Default)]
struct ScriptedService {
    responses: Mutex<VecDeque<anyhow::Result<ServiceResponse>>>,
    channels: Mutex<HashMap<String, mpsc::Receiver<StreamFrame>>>,
    submitted: Mutex<Vec<Vec<String>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl ScriptedService {
    fn respond(&self, resp: anyhow::Result<ServiceResponse>) {
        self.responses.lock().unwrap().push_back(resp);
    }

    fn channel(&self, id: &str) -> mpsc::Sender<StreamFrame> {
        let (tx, rx) = mpsc::channel(16);
        self.channels.lock().unwrap().insert(id.to_string(), rx);
        tx
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ProcessingService for ScriptedService {
    async fn submit(&self, payload: MultipartPayload) -> anyhow::Result<ServiceResponse> {
        self.submitted.lock().unwrap().push(
            payload
                .field_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response")))
    }

    fn open_progress_channel(&self, progress_id: &str) -> EventStream {
        self.events.lock().unwrap().push(format!("open {progress_id}"));
        let stream = match self.channels.lock().unwrap().remove(progress_id) {
            Some(rx) => EventStream::from_receiver(rx),
            None => EventStream::failed(format!("unknown channel {progress_id}")),
        };
        let events = self.events.clone();
        let id = progress_id.to_string();
        stream.with_on_close(move || events.lock().unwrap().push(format!("close {id}")))
    }
}

fn progress(percentage: u8, message: &str) -> StreamFrame {
    StreamFrame::Event(SseEvent {
        event: "progress".into(),
        data: format!(r#"{{"message":"{message}","percentage":{percentage}}}"#),
        id: None,
    })
}

fn json_response(status: u16, progress_id: Option<&str>, body: &str) -> ServiceResponse {
    ServiceResponse::ready(status, Some("application/json"), progress_id, body.as_bytes().to_vec())
}

fn pending_response(
    content_type: &str,
    progress_id: Option<&str>,
) -> (ServiceResponse, oneshot::Sender<Vec<u8>>) {
    let (tx, rx) = oneshot::channel::<Vec<u8>>();
    let resp = ServiceResponse {
        status: 200,
        content_type: Some(content_type.to_string()),
        progress_id: progress_id.map(str::to_string),
        body: Box::pin(async move { rx.await.map_err(|_| anyhow::anyhow!("body dropped")) }),
    };
    (resp, tx)
}

struct Fixture {
    _dir: tempfile::TempDir,
    input: ValidatedInput,
}

fn remote_with_reference_file() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("speaker.wav");
    std::fs::write(&reference, b"RIFF....WAVEfmt ").unwrap();
    let input = ValidatedInput {
        remote_reference: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into()),
        local_video_file: None,
        reference_mode: ReferenceMode::File,
        reference_file: Some(FileHandle::new(reference)),
        recording_uri: None,
    };
    Fixture { _dir: dir, input }
}

fn controller(service: &Arc<ScriptedService>) -> JobController {
    JobController::new(service.clone(), ObjectUrlStore::new())
}

#[tokio::test]
async fn streamed_job_reports_progress_then_succeeds() {
    let service = Arc::new(ScriptedService::default());
    service.respond(Ok(json_response(200, Some("job-42"), RESULT_JSON)));
    let tx = service.channel("job-42");
    tx.send(progress(10, "Extracting audio...")).await.unwrap();
    tx.send(progress(100, "Done")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    let first = jobs.start(&fx.input);
    assert_eq!(first.status, JobStatus::Submitting);
    assert_eq!(first.progress_percent, 0);

    let mut percents = vec![first.progress_percent];
    let mut statuses = vec![first.status];
    let done = jobs
        .run_to_completion(None, |job| {
            percents.push(job.progress_percent);
            statuses.push(job.status);
        })
        .await
        .unwrap();
    percents.dedup();

    assert_eq!(percents, vec![0, 10, 100]);
    assert!(statuses.contains(&JobStatus::Streaming));
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.id.as_deref(), Some("job-42"));
    let result = done.result.unwrap();
    assert_eq!(
        result.media,
        ResultMedia::Url {
            url: "https://bucket.example/processed_videos/out.mp4".into()
        }
    );
    assert_eq!(result.matching_speakers, vec!["SPEAKER_01".to_string()]);

    assert_eq!(service.events(), vec!["open job-42", "close job-42"]);
    assert_eq!(
        service.submitted.lock().unwrap()[0],
        vec!["youtube_url".to_string(), "reference_audio".to_string()]
    );
}

#[tokio::test]
async fn server_error_fails_without_streaming() {
    let service = Arc::new(ScriptedService::default());
    service.respond(Ok(json_response(400, None, r#"{"error":"no speech detected"}"#)));

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);

    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Server);
    assert_eq!(error.message, "no speech detected");
    assert!(jobs.next_update().await.is_none());
    assert!(service.events().is_empty());
}

#[tokio::test]
async fn malformed_event_is_ignored_and_stream_error_keeps_progress() {
    let service = Arc::new(ScriptedService::default());
    let (resp, _body) = pending_response("application/json", Some("job-7"));
    service.respond(Ok(resp));
    let tx = service.channel("job-7");
    tx.send(progress(30, "Diarizing")).await.unwrap();
    tx.send(StreamFrame::Event(SseEvent {
        event: "progress".into(),
        data: "{not json".into(),
        id: None,
    }))
    .await
    .unwrap();
    tx.send(StreamFrame::Error("connection reset".into())).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);

    assert_eq!(jobs.next_update().await.unwrap().status, JobStatus::Streaming);
    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.progress_percent, 30);
    assert_eq!(job.status_message, "Diarizing");

    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress_percent, 30);
    assert_eq!(job.status_message, INTERRUPTED_MESSAGE);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Stream);
    assert!(!jobs.has_live_subscription());
    assert_eq!(service.events(), vec!["open job-7", "close job-7"]);
}

#[tokio::test]
async fn duplicate_completion_closes_stream_once() {
    let service = Arc::new(ScriptedService::default());
    service.respond(Ok(json_response(200, Some("job-9"), RESULT_JSON)));
    let tx = service.channel("job-9");
    tx.send(progress(100, "Done")).await.unwrap();
    tx.send(progress(100, "Done")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    let done = jobs.run_to_completion(None, |_| {}).await.unwrap();

    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(service.events(), vec!["open job-9", "close job-9"]);
}

#[tokio::test]
async fn new_submission_closes_previous_subscription_first() {
    let service = Arc::new(ScriptedService::default());
    let (first, _first_body) = pending_response("application/json", Some("job-1"));
    service.respond(Ok(first));
    let _tx1 = service.channel("job-1");
    service.respond(Ok(json_response(200, Some("job-2"), RESULT_JSON)));
    let tx2 = service.channel("job-2");
    tx2.send(progress(100, "Done")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    assert_eq!(jobs.next_update().await.unwrap().status, JobStatus::Streaming);

    let restarted = jobs.start(&fx.input);
    assert_eq!(restarted.status, JobStatus::Submitting);
    assert_eq!(restarted.progress_percent, 0);
    assert!(restarted.id.is_none());

    let done = jobs.run_to_completion(None, |_| {}).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.id.as_deref(), Some("job-2"));
    assert_eq!(
        service.events(),
        vec!["open job-1", "close job-1", "open job-2", "close job-2"]
    );
}

#[tokio::test]
async fn stale_recording_fails_before_dispatch() {
    let service = Arc::new(ScriptedService::default());
    let urls = ObjectUrlStore::new();
    let uri = urls.acquire(Slot::ReferenceAudio, ByteSource::Memory(Arc::new(vec![1, 2, 3])));
    urls.release(Slot::ReferenceAudio);

    let input = ValidatedInput {
        remote_reference: Some("https://youtu.be/dQw4w9WgXcQ".into()),
        local_video_file: None,
        reference_mode: ReferenceMode::Record,
        reference_file: None,
        recording_uri: Some(uri),
    };
    let mut jobs = JobController::new(service.clone(), urls);
    let job = jobs.start(&input);

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Encoding);
    assert!(jobs.next_update().await.is_none());
    assert_eq!(service.submissions(), 0);
    assert!(!jobs.has_live_subscription());
}

#[tokio::test]
async fn dispatch_failure_is_request_error() {
    let service = Arc::new(ScriptedService::default());
    service.respond(Err(anyhow::anyhow!("connection refused")));

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);

    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Request);
    assert!(error.message.contains("connection refused"));
}

#[tokio::test]
async fn cancel_closes_subscription() {
    let service = Arc::new(ScriptedService::default());
    let (resp, _body) = pending_response("application/json", Some("job-3"));
    service.respond(Ok(resp));
    let tx = service.channel("job-3");
    tx.send(progress(20, "Separating")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    jobs.next_update().await.unwrap();
    assert_eq!(jobs.next_update().await.unwrap().progress_percent, 20);

    let job = jobs.cancel().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress_percent, 20);
    assert_eq!(job.status_message, CANCELLED_MESSAGE);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Cancelled);
    assert!(jobs.cancel().is_none());
    assert!(jobs.next_update().await.is_none());
    assert_eq!(service.events(), vec!["open job-3", "close job-3"]);
}

#[tokio::test]
async fn run_to_completion_cancels_after_limit() {
    let service = Arc::new(ScriptedService::default());
    let (resp, _body) = pending_response("application/json", Some("job-slow"));
    service.respond(Ok(resp));
    let _tx = service.channel("job-slow");

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);

    let mut seen = Vec::new();
    let job = jobs
        .run_to_completion(Some(Duration::from_millis(50)), |job| seen.push(job.status))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(seen.last(), Some(&JobStatus::Failed));
    assert_eq!(service.events(), vec!["open job-slow", "close job-slow"]);
}

#[tokio::test]
async fn media_body_without_progress_awaits_result() {
    let service = Arc::new(ScriptedService::default());
    let (resp, body) = pending_response("video/mp4", None);
    service.respond(Ok(resp));

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);

    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::AwaitingResult);
    assert!(!jobs.has_live_subscription());

    body.send(b"\x00\x00\x00\x18ftypmp42".to_vec()).unwrap();
    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    match job.result.unwrap().media {
        ResultMedia::Inline { mime_type, bytes } => {
            assert_eq!(mime_type, "video/mp4");
            assert_eq!(bytes.len(), 12);
        }
        other => panic!("unexpected media: {other:?}"),
    }
}

#[tokio::test]
async fn completion_before_body_succeeds_and_result_fills_in_later() {
    let service = Arc::new(ScriptedService::default());
    let (resp, body) = pending_response("application/json", Some("job-5"));
    service.respond(Ok(resp));
    let tx = service.channel("job-5");
    tx.send(progress(100, "Done")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    assert_eq!(jobs.next_update().await.unwrap().status, JobStatus::Streaming);

    let job = tokio::time::timeout(Duration::from_millis(300), jobs.next_update())
        .await
        .expect("100% must settle the job without waiting for the body")
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress_percent, 100);
    assert!(job.result.is_none());
    assert!(!jobs.has_live_subscription());
    assert_eq!(service.events(), vec!["open job-5", "close job-5"]);

    body.send(RESULT_JSON.as_bytes().to_vec()).unwrap();
    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.result.is_some());
    assert!(jobs.next_update().await.is_none());
}

#[tokio::test]
async fn unusable_late_body_leaves_success_untouched() {
    let service = Arc::new(ScriptedService::default());
    let (resp, body) = pending_response("application/json", Some("job-6"));
    service.respond(Ok(resp));
    let tx = service.channel("job-6");
    tx.send(progress(100, "Done")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    jobs.next_update().await.unwrap();
    assert_eq!(jobs.next_update().await.unwrap().status, JobStatus::Succeeded);

    body.send(br#"{"error":"late failure"}"#.to_vec()).unwrap();
    assert!(jobs.next_update().await.is_none());
    let job = jobs.snapshot().unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.error.is_none());
}

#[tokio::test]
async fn cancel_after_completion_drops_pending_body() {
    let service = Arc::new(ScriptedService::default());
    let (resp, _body) = pending_response("application/json", Some("job-4"));
    service.respond(Ok(resp));
    let tx = service.channel("job-4");
    tx.send(progress(100, "Done")).await.unwrap();

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    jobs.next_update().await.unwrap();
    assert_eq!(jobs.next_update().await.unwrap().status, JobStatus::Succeeded);

    assert!(jobs.cancel().is_none());
    assert!(jobs.next_update().await.is_none());
    assert_eq!(jobs.status(), JobStatus::Succeeded);
}

#[tokio::test]
async fn error_body_during_streaming_fails_and_closes() {
    let service = Arc::new(ScriptedService::default());
    service.respond(Ok(json_response(200, Some("job-8"), r#"{"error":"reference audio too short"}"#)));
    let _tx = service.channel("job-8");

    let fx = remote_with_reference_file();
    let mut jobs = controller(&service);
    jobs.start(&fx.input);
    assert_eq!(jobs.next_update().await.unwrap().status, JobStatus::Streaming);

    let job = jobs.next_update().await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.status_message, "reference audio too short");
    assert_eq!(job.error.unwrap().kind, ErrorKind::Server);
    assert_eq!(service.events(), vec!["open job-8", "close job-8"]);
}
