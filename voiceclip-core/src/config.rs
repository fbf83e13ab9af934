use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_PROCESS_PATH: &str = "/process_video";
pub const DEFAULT_STREAM_PATH: &str = "/stream";
pub const DEFAULT_PROGRESS_HEADER: &str = "X-Progress-ID";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_process_path() -> String {
    DEFAULT_PROCESS_PATH.into()
}

fn default_stream_path() -> String {
    DEFAULT_STREAM_PATH.into()
}

fn default_progress_header() -> String {
    DEFAULT_PROGRESS_HEADER.into()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// Processing a video takes minutes; the request stays open until it is done.
fn default_request_timeout_secs() -> u64 {
    900
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_process_path")]
    pub process_path: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_progress_header")]
    pub progress_header: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            process_path: default_process_path(),
            stream_path: default_stream_path(),
            progress_header: default_progress_header(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
