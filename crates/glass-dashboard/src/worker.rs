use crate::config::Config;
use crate::logging;
use crate::pipe::{PipeError, PipeWriter};
use anyhow::{Context, Result};
use glass_core::frame::{FrameMsg, PipeFrame};
use glass_core::ChannelKind;
use glass_salt_adapter::{open_source, DataSource, EventFilter, SourceError, SourceSettings};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

#[derive(clap::Args, Debug, Clone)]
pub struct WorkerArgs {
    #[arg(long)]
    pub channel: ChannelKind,
    /// JSON-encoded source settings, as written by the dashboard.
    #[arg(long)]
    pub source_settings: String,
    #[arg(long = "event-filter")]
    pub event_filter: Vec<String>,
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Delivered,
    Failed(String),
    Disconnected,
}

impl WorkerOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            WorkerOutcome::Delivered => ExitCode::SUCCESS,
            WorkerOutcome::Failed(_) | WorkerOutcome::Disconnected => ExitCode::FAILURE,
        }
    }
}

/// Arguments the dashboard passes to its own executable to start a worker.
pub fn worker_args(config: &Config) -> Result<Vec<String>> {
    let settings = serde_json::to_string(&config.source).context("failed to encode source settings")?;
    let mut args = vec!["worker".to_string(), "--source-settings".to_string(), settings];
    for prefix in &config.event_filter.tag_prefixes {
        args.push("--event-filter".to_string());
        args.push(prefix.clone());
    }
    if let Some(dir) = &config.log_dir {
        args.push("--log-dir".to_string());
        args.push(dir.display().to_string());
    }
    if config.debug {
        args.push("--debug".to_string());
    }
    Ok(args)
}

pub fn main(args: WorkerArgs) -> ExitCode {
    let role = format!("worker-{}", args.channel);
    let _log_guard = logging::init_logging(&role, args.log_dir.as_deref(), args.debug);
    let stdout = io::stdout();
    let mut writer = PipeWriter::new(stdout.lock());

    let settings: SourceSettings = match serde_json::from_str(&args.source_settings) {
        Ok(settings) => settings,
        Err(err) => {
            let outcome = fail(&mut writer, args.channel, format!("invalid source settings: {err}"));
            return outcome.exit_code();
        }
    };
    info!(event = "worker_start", channel = %args.channel, source = settings.label(), pid = std::process::id());
    let filter = EventFilter::new(&args.event_filter);
    let source = open_source(&settings);
    let outcome = run_channel(args.channel, source.as_ref(), &filter, &mut writer);
    info!(event = "worker_stop", channel = %args.channel, outcome = ?outcome);
    outcome.exit_code()
}

/// Produces everything one channel carries. One-shot channels write a single
/// frame; the event channel writes until the subscription breaks.
pub fn run_channel<W: Write>(
    channel: ChannelKind,
    source: &(dyn DataSource + Send),
    filter: &EventFilter,
    writer: &mut PipeWriter<W>,
) -> WorkerOutcome {
    match channel {
        ChannelKind::Inventory => match source.fetch_inventory() {
            Ok(inventory) => deliver(writer, channel, FrameMsg::Inventory(inventory)),
            Err(err) => fail(writer, channel, err.to_string()),
        },
        ChannelKind::Jobs => match source.fetch_jobs() {
            Ok(jobs) => deliver(writer, channel, FrameMsg::Jobs(jobs)),
            Err(err) => fail(writer, channel, err.to_string()),
        },
        ChannelKind::Events => stream_events(channel, source, filter, writer),
    }
}

fn stream_events<W: Write>(
    channel: ChannelKind,
    source: &(dyn DataSource + Send),
    filter: &EventFilter,
    writer: &mut PipeWriter<W>,
) -> WorkerOutcome {
    let stream = match source.subscribe_events() {
        Ok(stream) => stream,
        Err(err) => return fail(writer, channel, err.to_string()),
    };
    let mut delivered: u64 = 0;
    let mut skipped: u64 = 0;
    for item in stream {
        match item {
            Ok(event) => {
                if !filter.matches(&event.tag) {
                    skipped += 1;
                    continue;
                }
                let frame = PipeFrame::new(channel, FrameMsg::Event(event));
                match writer.write_frame(&frame) {
                    Ok(()) => delivered += 1,
                    Err(PipeError::Io(err)) => return disconnected(channel, &err),
                    Err(PipeError::Frame(err)) => {
                        warn!(event = "event_dropped", channel = %channel, error = %err);
                    }
                }
            }
            Err(err) => {
                debug!(event = "event_stream_break", delivered, skipped);
                return fail(writer, channel, err.to_string());
            }
        }
    }
    debug!(event = "event_stream_end", delivered, skipped);
    fail(writer, channel, SourceError::SubscriptionEnded.to_string())
}

fn deliver<W: Write>(writer: &mut PipeWriter<W>, channel: ChannelKind, msg: FrameMsg) -> WorkerOutcome {
    match writer.write_frame(&PipeFrame::new(channel, msg)) {
        Ok(()) => WorkerOutcome::Delivered,
        Err(PipeError::Io(err)) => disconnected(channel, &err),
        Err(PipeError::Frame(err)) => fail(writer, channel, err.to_string()),
    }
}

fn fail<W: Write>(writer: &mut PipeWriter<W>, channel: ChannelKind, message: String) -> WorkerOutcome {
    warn!(event = "source_failure", channel = %channel, error = %message);
    if let Err(err) = writer.write_frame(&PipeFrame::failure(channel, message.clone())) {
        debug!(event = "failure_marker_lost", channel = %channel, error = %err);
    }
    WorkerOutcome::Failed(message)
}

fn disconnected(channel: ChannelKind, err: &io::Error) -> WorkerOutcome {
    info!(event = "pipe_disconnected", channel = %channel, error = %err);
    WorkerOutcome::Disconnected
}
