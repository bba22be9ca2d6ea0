mod config;
mod logging;
mod pipe;
mod state;
mod supervisor;
mod theme;
mod ui;
mod worker;

use crate::config::{Config, DashboardArgs};
use crate::pipe::{register_readable, PipeEvent};
use crate::state::App;
use crate::supervisor::{Supervisor, WorkerLauncher, WorkerMode};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use glass_core::ChannelKind;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const PIPE_QUEUE_CAPACITY: usize = 256;
const MAX_PIPE_EVENTS_PER_FRAME: usize = 512;
const REAP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "salt-glass", about = "Live terminal dashboard for a Salt master")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    dashboard: DashboardArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Internal: produce one data channel on stdout.
    #[command(hide = true)]
    Worker(worker::WorkerArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Worker(args)) => worker::main(args),
        None => match run(cli.dashboard) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("salt-glass: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(args: DashboardArgs) -> Result<()> {
    let config = config::load_config(&args)?;
    let log_guard = logging::init_logging("dashboard", config.log_dir.as_deref(), config.debug);
    info!(
        event = "dashboard_start",
        source = config.source.label(),
        config_path = ?config.config_path,
        log_file = log_guard.as_ref().is_some_and(logging::LogGuard::is_file_backed),
        quit_key = %config.quit_key.label()
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_dashboard(config))
}

async fn run_dashboard(config: Config) -> Result<()> {
    let mut app = App::new(config.quit_key, config.source.label());
    let launcher = WorkerLauncher::current_exe(worker::worker_args(&config)?)
        .context("cannot locate the salt-glass executable")?;
    let mut supervisor = Supervisor::new(launcher);

    let (pipe_tx, mut pipe_rx) = mpsc::channel(PIPE_QUEUE_CAPACITY);
    for channel in ChannelKind::ALL {
        start_worker(&mut app, &mut supervisor, channel, &pipe_tx);
    }
    drop(pipe_tx);
    app.start_running();

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, &mut supervisor, &mut pipe_rx).await;

    app.begin_shutdown();
    let report = supervisor.shutdown(config.shutdown_grace).await;
    let restored = restore_terminal(&mut terminal);
    app.terminate();
    info!(
        event = "dashboard_stop",
        joined = report.joined,
        killed = report.killed,
        abandoned = report.abandoned
    );
    result.and(restored)
}

fn start_worker(
    app: &mut App,
    supervisor: &mut Supervisor,
    channel: ChannelKind,
    tx: &mpsc::Sender<PipeEvent>,
) {
    let spawned = match WorkerMode::for_channel(channel) {
        WorkerMode::OneShot => supervisor.spawn_one_shot(channel),
        WorkerMode::Streaming => supervisor.spawn_streaming(channel),
    };
    match spawned {
        Ok(stdout) => {
            register_readable(channel, stdout, tx.clone());
        }
        Err(err) => {
            warn!(event = "worker_spawn_failed", channel = %channel, error = %err);
            app.note_spawn_failure(channel, err.to_string());
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    supervisor: &mut Supervisor,
    pipe_rx: &mut mpsc::Receiver<PipeEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut reap_tick = tokio::time::interval(REAP_INTERVAL);

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        tokio::select! {
            Some(event) = pipe_rx.recv() => {
                handle_pipe_event(app, supervisor, event);
                for _ in 0..MAX_PIPE_EVENTS_PER_FRAME {
                    match pipe_rx.try_recv() {
                        Ok(event) => handle_pipe_event(app, supervisor, event),
                        Err(_) => break,
                    }
                }
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if key.kind == KeyEventKind::Press && app.handle_key(key) {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(event = "terminal_event_error", error = %err);
                    }
                    None => break,
                }
            }
            _ = reap_tick.tick() => {
                for (channel, status) in supervisor.reap_exited() {
                    app.note_worker_exit(channel, status);
                }
            }
        }
    }

    info!(event = "ui_loop_exit", running_workers = supervisor.running());
    Ok(())
}

fn handle_pipe_event(app: &mut App, supervisor: &mut Supervisor, event: PipeEvent) {
    if let Some(channel) = app.on_pipe_event(event) {
        if let Some(status) = supervisor.reap(channel) {
            app.note_worker_exit(channel, status);
        }
    }
}
