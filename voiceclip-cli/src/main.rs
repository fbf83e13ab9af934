use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use voiceclip_core::config::ClientConfig;
use voiceclip_core::input::ReferenceMode;
use voiceclip_core::job::{JobStatus, ResultMedia, SubmissionJob};
use voiceclip_core::object_url::ObjectUrlStore;
use voiceclip_core::resolver::{MediaResolver, is_remote_platform_uri};
use voiceclip_core::types::{FileHandle, MediaSource, Slot};
use voiceclip_core::validate::{RawInput, validate};
use voiceclip_runtime::config_store::{ConfigStore, DEFAULT_CONFIG_FILE};
use voiceclip_runtime::service::{HttpProcessingService, build_controller};

#[derive(Parser, Debug)]
#[command(name = "voiceclip")]
#[command(about = "Isolate one speaker's segments from a video")]
#[command(version)]
struct Args {
    /// Config file (JSON)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE, env = "VOICECLIP_CONFIG")]
    config: PathBuf,

    /// Override the service base URL
    #[arg(long, global = true, env = "VOICECLIP_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a video and a reference voice sample, then follow the job
    Submit(SubmitArgs),

    /// Print how a source would be previewed
    Preview {
        #[arg(long, value_enum, default_value = "video")]
        slot: SlotArg,

        /// URL or local file path
        source: String,
    },

    /// Check that the service answers
    Ping,

    /// Print the effective config
    Config {
        /// Write the effective config back to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
    #[arg(long, conflicts_with = "video_file", required_unless_present = "video_file")]
    youtube_url: Option<String>,

    #[arg(long)]
    video_file: Option<PathBuf>,

    /// Reference voice sample (wav or mp3)
    #[arg(long, conflicts_with = "recording", required_unless_present = "recording")]
    reference_audio: Option<PathBuf>,

    /// Raw recorded audio, sent as a recording instead of a chosen file
    #[arg(long)]
    recording: Option<PathBuf>,

    #[arg(long, default_value = "audio/wav")]
    recording_mime: String,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Where to write the result when the service returns media inline
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SlotArg {
    Video,
    Audio,
    Output,
}

impl From<SlotArg> for Slot {
    fn from(s: SlotArg) -> Self {
        match s {
            SlotArg::Video => Slot::Video,
            SlotArg::Audio => Slot::ReferenceAudio,
            SlotArg::Output => Slot::Output,
        }
    }
}

fn source_from_arg(raw: &str) -> MediaSource {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        MediaSource::remote(trimmed)
    } else {
        MediaSource::local_file(FileHandle::new(trimmed))
    }
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let store = ConfigStore::at_path(&args.config);
    let cfg = store.load_or_default()?;
    Ok(match &args.base_url {
        Some(url) => cfg.with_base_url(url.clone()),
        None => cfg,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("encode JSON")?);
    Ok(())
}

fn print_progress(job: &SubmissionJob) {
    match job.status {
        JobStatus::Succeeded | JobStatus::Failed => {}
        status => println!(
            "[{:>3}%] {:<15} {}",
            job.progress_percent,
            status.label(),
            job.status_message
        ),
    }
}

async fn submit(cfg: ClientConfig, args: SubmitArgs) -> anyhow::Result<()> {
    let urls = ObjectUrlStore::new();
    let mut previews = MediaResolver::new(urls.clone());

    let video_file = args.video_file.as_deref().map(FileHandle::new);
    let video_source = match (&args.youtube_url, &video_file) {
        (Some(url), _) => Some(MediaSource::remote(url.clone())),
        (None, Some(handle)) => Some(MediaSource::local_file(handle.clone())),
        (None, None) => None,
    };
    if let Some(d) = previews.resolve(video_source.as_ref(), Slot::Video) {
        log::info!("video preview: {} ({})", d.uri, d.mime_type);
    }

    let (reference_mode, reference_file, recording_uri) = match &args.recording {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read recording: {}", path.display()))?;
            let source = MediaSource::recording(bytes, args.recording_mime.clone());
            let d = previews
                .resolve(Some(&source), Slot::ReferenceAudio)
                .ok_or_else(|| anyhow!("recording could not be published"))?;
            log::info!("recording preview: {} ({})", d.uri, d.mime_type);
            (ReferenceMode::Record, None, Some(d.uri))
        }
        None => {
            let handle = args.reference_audio.as_deref().map(FileHandle::new);
            let source = handle.clone().map(MediaSource::local_file);
            if let Some(d) = previews.resolve(source.as_ref(), Slot::ReferenceAudio) {
                log::info!("reference preview: {} ({})", d.uri, d.mime_type);
            }
            (ReferenceMode::File, handle, None)
        }
    };

    let input = validate(RawInput {
        remote_reference: args.youtube_url.clone().unwrap_or_default(),
        local_video_file: video_file,
        reference_mode,
        reference_file,
        recording_uri,
    })?;

    let mut jobs = build_controller(cfg, urls.clone())?;
    print_progress(&jobs.start(&input));
    let limit = args.timeout.map(Duration::from_secs);
    let job = jobs
        .run_to_completion(limit, print_progress)
        .await
        .ok_or_else(|| anyhow!("no job was started"))?;

    if let Some(result) = &job.result {
        if let ResultMedia::Inline { bytes, .. } = &result.media {
            if let Some(out) = &args.output {
                write_output(out, bytes)?;
            }
        }
        if let Some(d) = previews.resolve(Some(&result.media.to_source()), Slot::Output) {
            log::info!("output preview: {} ({})", d.uri, d.mime_type);
        }
    }
    print_json(&job)?;

    drop(jobs);
    previews.teardown();
    log::debug!("object urls at exit: {:?}", urls.stats());

    match job.status {
        JobStatus::Succeeded => Ok(()),
        _ => Err(anyhow!(
            "job failed: {}",
            job.error.map(|e| e.message).unwrap_or(job.status_message)
        )),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("write result: {}", path.display()))?;
    println!("result written to {}", path.display());
    Ok(())
}

fn preview(slot: Slot, raw: &str) -> anyhow::Result<()> {
    let source = source_from_arg(raw);
    if let MediaSource::RemoteReference { uri } = &source {
        if slot == Slot::Video && !is_remote_platform_uri(uri) {
            log::warn!("{uri} is not a recognized video platform link");
        }
    }

    let mut resolver = MediaResolver::new(ObjectUrlStore::new());
    let descriptor = resolver.resolve(Some(&source), slot);
    let printed = print_json(&descriptor);
    resolver.teardown();
    printed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    log::debug!("service base url: {}", cfg.base_url);

    match args.command {
        Command::Submit(submit_args) => submit(cfg, submit_args).await,
        Command::Preview { slot, source } => preview(slot.into(), &source),
        Command::Ping => {
            let svc = HttpProcessingService::new(cfg)?;
            let message = svc.ping().await?;
            println!("{} answered: {message}", svc.config().base_url);
            Ok(())
        }
        Command::Config { save } => {
            print_json(&cfg)?;
            if save {
                ConfigStore::at_path(&args.config).save(&cfg)?;
                println!("saved to {}", args.config.display());
            }
            Ok(())
        }
    }
}
