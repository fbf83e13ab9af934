//! Server-sent events over reqwest.
//!
//! `open_event_stream` returns immediately with an [`EventStream`]; the
//! connection runs in a background task and reports through the frame channel.
//! Connection failures arrive as [`StreamFrame::Error`], never as a return value.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

const FRAME_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Event(SseEvent),
    Error(String),
}

/// Incremental `text/event-stream` decoder. Feed it chunks as they arrive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(ev) = self.process_line(&line) {
                out.push(ev);
            }
        }
        out
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            // `retry` and unknown fields are ignored.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| "message".into()),
            data,
            id: self.last_id.clone(),
        })
    }
}

/// Receiving end of one event-stream subscription.
///
/// Closing is idempotent; after `close` no further frames are delivered.
pub struct EventStream {
    frames: mpsc::Receiver<StreamFrame>,
    task: Option<JoinHandle<()>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
    closed: bool,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("closed", &self.closed)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl EventStream {
    pub fn from_receiver(frames: mpsc::Receiver<StreamFrame>) -> Self {
        Self {
            frames,
            task: None,
            on_close: None,
            closed: false,
        }
    }

    /// A stream that reports `message` as its only frame.
    pub fn failed(message: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(StreamFrame::Error(message.into()));
        Self::from_receiver(rx)
    }

    /// Runs `f` exactly once, on the first `close`.
    pub fn with_on_close(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next frame, or `None` once closed or the sender is gone. Cancel safe.
    pub async fn recv(&mut self) -> Option<StreamFrame> {
        if self.closed {
            return None;
        }
        self.frames.recv().await
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.frames.close();
        if let Some(f) = self.on_close.take() {
            f();
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Subscribes to `url` as an event stream.
pub fn open_event_stream(client: reqwest::Client, url: Url) -> EventStream {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let task = tokio::spawn(async move {
        if let Err(message) = pump_events(client, url, &tx).await {
            let _ = tx.send(StreamFrame::Error(message)).await;
        }
    });
    EventStream::from_receiver(rx).with_task(task)
}

async fn pump_events(
    client: reqwest::Client,
    url: Url,
    tx: &mpsc::Sender<StreamFrame>,
) -> Result<(), String> {
    let resp = client
        .get(url.clone())
        .header("Accept", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .send()
        .await
        .map_err(|e| format!("event stream connect failed: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(format!("event stream rejected with status {}", status.as_u16()));
    }
    log::debug!("event stream open: {url}");

    let mut decoder = SseDecoder::new();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| format!("event stream read failed: {e}"))?;
        for event in decoder.push(&chunk) {
            if tx.send(StreamFrame::Event(event)).await.is_err() {
                // Receiver closed; nobody is listening anymore.
                return Ok(());
            }
        }
    }

    Err("event stream ended".into())
}
