//! `logseald` daemon: UDP syslog ingest with Merkle-sealed checkpoints,
//! plus the companion offline verifier over the journal it writes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use logseal_core::batch::BatchWorker;
use logseal_core::registry::LogRegistry;
use logseal_core::{JournalHandle, LogSink, RegistryPublisher};
use logseald::{receiver, verify};

const DEFAULT_BIND: &str = "0.0.0.0:5140";
const DEFAULT_CHECKPOINT_PATH: &str = "checkpoints";
const DEFAULT_WINDOW_SECS: u64 = 3;
/// Ingest queue depth; UDP buffers absorb bursts beyond it.
const QUEUE_DEPTH: usize = 1024;

/// Logseald command line.
#[derive(Parser, Debug)]
#[command(author, version, about = "Tamper-evident syslog ingester", long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Directory receiving per-source daily log files.
    #[arg(long, env = "LOGSEAL_LOG_ROOT", default_value = ".")]
    log_root: PathBuf,
    /// Directory holding the daily checkpoint journal.
    #[arg(long, env = "LOGSEAL_CHECKPOINT_PATH", default_value = DEFAULT_CHECKPOINT_PATH)]
    checkpoint_path: PathBuf,
    /// Checkpoint window in seconds: sealing granularity and batch cadence.
    #[arg(long, env = "LOGSEAL_WINDOW_SECS", default_value_t = DEFAULT_WINDOW_SECS)]
    window_secs: u64,
    /// Subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Commands for logseald.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingest daemon.
    Serve {
        /// UDP bind address for syslog datagrams.
        #[arg(long, env = "LOGSEAL_BIND", default_value = DEFAULT_BIND)]
        bind: String,
    },
    /// Re-hash recorded ranges and validate stored Merkle proofs.
    Verify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // A corrupt journal is fatal here and nowhere else.
    let handle = Arc::new(
        JournalHandle::load(&cli.checkpoint_path)
            .context("failed to load checkpoint journal")?,
    );
    let window = chrono::Duration::seconds(cli.window_secs as i64);

    match cli.command {
        Commands::Serve { bind } => serve(handle, cli.log_root, window, &bind).await,
        Commands::Verify => verify::run(&handle),
    }
}

async fn serve(
    handle: Arc<JournalHandle>,
    log_root: PathBuf,
    window: chrono::Duration,
    bind: &str,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(bind)
        .await
        .with_context(|| format!("failed to bind UDP socket {bind}"))?;
    info!(%bind, window_secs = window.num_seconds(), "listening for syslog datagrams");

    let (queue_tx, queue_rx) = mpsc::channel(QUEUE_DEPTH);
    let sink = LogSink::new(handle.clone(), log_root, window);
    let writer = tokio::spawn(sink.run(queue_rx));

    let publisher: Arc<dyn RegistryPublisher> = Arc::new(LogRegistry);
    let batch = tokio::spawn(BatchWorker::new(handle, window, publisher).run());
    let receiver = tokio::spawn(receiver::run(socket, queue_tx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutdown signal received");

    // Receiver first: its queue sender drops with it, the writer drains the
    // closed queue, and only then is the batch worker interrupted.
    receiver.abort();
    let _ = receiver.await;
    writer.await.context("log writer task failed")?;
    batch.abort();
    let _ = batch.await;
    info!("clean shutdown");
    Ok(())
}
