//! Durable append writer: the single consumer of the ingest queue.

use std::fs::{self, OpenOptions};
use std::io::{Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime};
use tokio::sync::mpsc;

use crate::checkpoint;
use crate::journal::JournalHandle;
use crate::ts;

/// One in-flight log message; discarded once written.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Arrival timestamp, microsecond resolution.
    pub ts: NaiveDateTime,
    /// Source address, typically a dotted quad.
    pub source: String,
    /// Message payload, already stripped of framing.
    pub message: String,
}

/// Owns all log-file write I/O and feeds the checkpoint updater.
#[derive(Debug, Clone)]
pub struct LogSink {
    handle: Arc<JournalHandle>,
    log_root: PathBuf,
    window: Duration,
}

impl LogSink {
    /// Create a sink appending under `log_root` with the given checkpoint
    /// window.
    pub fn new(handle: Arc<JournalHandle>, log_root: PathBuf, window: Duration) -> Self {
        Self {
            handle,
            log_root,
            window,
        }
    }

    /// Append one record to its daily file and report the new position to
    /// the checkpoint updater.
    ///
    /// The file handle lives only for this one append.
    pub fn append(&self, record: &LogRecord) -> anyhow::Result<()> {
        let dir = self.log_root.join(&record.source);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let path = dir.join(format!("{}.log", record.ts.format("%Y-%m-%d")));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let line = format!("{} {}\n", ts::format_micros(&record.ts), record.message);
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to log file {}", path.display()))?;
        let current_pos = file
            .stream_position()
            .with_context(|| format!("failed to read position of {}", path.display()))?;
        drop(file);

        if current_pos > 0 {
            checkpoint::record_append(&self.handle, self.window, &path, record.ts, current_pos)?;
        }
        Ok(())
    }

    /// Drain the queue until every sender is gone.
    ///
    /// A failed append is logged and the record dropped; the pipeline keeps
    /// going. The channel closing is the shutdown sentinel: remaining items
    /// are drained, then the loop exits.
    pub async fn run(self, mut queue: mpsc::Receiver<LogRecord>) {
        while let Some(record) = queue.recv().await {
            if let Err(err) = self.append(&record) {
                tracing::error!(error = %err, source = %record.source, "dropping log record");
            }
        }
        tracing::info!("log writer drained, exiting");
    }
}
