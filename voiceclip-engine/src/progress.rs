use voiceclip_core::job::ProgressUpdate;
use voiceclip_providers::parse::parse_progress_event;
use voiceclip_providers::sse::{EventStream, StreamFrame};

pub const PROGRESS_EVENT: &str = "progress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressSignal {
    Update(ProgressUpdate),
    Completed(ProgressUpdate),
    Failed(String),
}

/// One job's progress subscription.
///
/// Yields updates in receipt order and at most one terminal signal
/// (`Completed` or `Failed`); the underlying stream is closed right after it.
#[derive(Debug)]
pub struct ProgressSubscription {
    progress_id: String,
    stream: EventStream,
    finished: bool,
}

impl ProgressSubscription {
    pub fn new(progress_id: impl Into<String>, stream: EventStream) -> Self {
        Self {
            progress_id: progress_id.into(),
            stream,
            finished: false,
        }
    }

    pub fn progress_id(&self) -> &str {
        &self.progress_id
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    /// Next signal; `None` after the terminal signal or `close`. Cancel safe.
    pub async fn next(&mut self) -> Option<ProgressSignal> {
        loop {
            if self.finished {
                return None;
            }

            let frame = match self.stream.recv().await {
                Some(frame) => frame,
                None if self.stream.is_closed() => {
                    self.finished = true;
                    return None;
                }
                None => StreamFrame::Error("event stream closed".into()),
            };

            match frame {
                StreamFrame::Error(message) => {
                    log::warn!("progress channel {} failed: {message}", self.progress_id);
                    self.close();
                    return Some(ProgressSignal::Failed(message));
                }
                StreamFrame::Event(event) => {
                    if event.event != PROGRESS_EVENT {
                        continue;
                    }
                    let update = match parse_progress_event(&event.data) {
                        Ok(update) => update,
                        Err(e) => {
                            log::warn!("dropping event on channel {}: {e}", self.progress_id);
                            continue;
                        }
                    };

                    if update.is_complete() {
                        self.close();
                        return Some(ProgressSignal::Completed(update));
                    }
                    return Some(ProgressSignal::Update(update));
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.finished = true;
        self.stream.close();
    }
}
