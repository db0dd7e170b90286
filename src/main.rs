//! Route scanner - package sorting desk
//!
//! Operators scan tracking codes against a route; each scan is checked
//! against the day's reference list and recorded locally before being
//! written to the durable store in the background.
//!
//! Module structure:
//! - `domain/` - Core business types (Route, ScanRecord, statuses)
//! - `io/` - External interfaces (durable stores, text import, console)
//! - `services/` - Business logic (Desk, ScanStore, evaluator, stats)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use route_scanner::infra::{Config, Metrics, StoreBackend};
use route_scanner::io::{
    load_snapshot, Console, Feedback, Flow, JsonlStore, LogFeedback, MemoryStore, RemoteStore, TerminalBell,
};
use route_scanner::services::{create_desk_channel, create_sync_worker, Desk, ScanStore};
use std::io::BufRead;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Queue depth for console commands
const DESK_QUEUE: usize = 64;

/// Route scanner - package sorting desk
#[derive(Parser, Debug)]
#[command(name = "route-scanner", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with console output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "route-scanner starting");

    let args = Args::parse();
    let config = match args.config {
        Some(path) => Config::load_from_path(&path),
        None => Config::load(&[]),
    };

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        store_backend = ?config.store_backend(),
        store_dir = %config.store_dir(),
        chunk_size = %config.sync_chunk_size(),
        queue_size = %config.sync_queue_size(),
        bell = %config.feedback_bell(),
        "config_loaded"
    );

    let remote: Arc<dyn RemoteStore> = match config.store_backend() {
        StoreBackend::Jsonl => Arc::new(JsonlStore::new(config.store_dir())?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    let metrics = Arc::new(Metrics::new());

    // Start the sync worker (applies durable writes off the desk loop)
    let (sync, worker, failure_rx) = create_sync_worker(remote.clone(), metrics.clone(), config.sync_queue_size());
    let worker_task = tokio::spawn(worker.run());

    let feedback: Box<dyn Feedback> = if config.feedback_bell() { Box::new(TerminalBell) } else { Box::new(LogFeedback) };
    let mut store = ScanStore::new(sync, feedback, metrics.clone(), config.sync_chunk_size());

    // Subscribe before loading; anything inserted meanwhile merges by id
    let feed_rx = remote.subscribe_scans();
    store.hydrate(load_snapshot(remote.as_ref()).await);

    let mut desk = Desk::new(store, metrics, config.metrics_interval_secs());
    let (handle, cmd_rx) = create_desk_channel(DESK_QUEUE);
    let desk_task = tokio::spawn(async move {
        desk.run(cmd_rx, feed_rx, failure_rx).await;
    });

    run_console(Console::new(handle)).await?;

    // Console dropped: the desk stops, then the worker drains its queue
    desk_task.await.context("desk task panicked")?;
    worker_task.await.context("sync worker panicked")?;

    info!("route-scanner shutdown complete");
    Ok(())
}

/// Read stdin on a plain thread; a blocking read cannot be cancelled
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "stdin_read_failed");
                    break;
                }
            }
        }
    });
    rx
}

async fn run_console(mut console: Console) -> anyhow::Result<()> {
    let mut lines = spawn_stdin_reader();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"route-scanner ready; type `help` for commands\n").await?;
    stdout.flush().await?;

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                match console.handle_line(&line).await? {
                    Flow::Continue(text) => {
                        if !text.is_empty() {
                            stdout.write_all(text.as_bytes()).await?;
                            stdout.write_all(b"\n").await?;
                            stdout.flush().await?;
                        }
                    }
                    Flow::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown_signal_received");
                break;
            }
        }
    }
    Ok(())
}
