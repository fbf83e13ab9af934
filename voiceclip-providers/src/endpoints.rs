use anyhow::Context;
use url::Url;
use voiceclip_core::config::ClientConfig;

pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub fn process_url(cfg: &ClientConfig) -> String {
    join_url(&cfg.base_url, &cfg.process_path)
}

pub fn ping_url(cfg: &ClientConfig) -> String {
    join_url(&cfg.base_url, "/ping")
}

/// Event stream for one job: `{base}{stream_path}?channel=<id>`.
pub fn stream_url(cfg: &ClientConfig, progress_id: &str) -> anyhow::Result<Url> {
    let raw = join_url(&cfg.base_url, &cfg.stream_path);
    let mut url = Url::parse(&raw).with_context(|| format!("invalid stream url: {raw}"))?;
    url.query_pairs_mut().append_pair("channel", progress_id);
    Ok(url)
}
