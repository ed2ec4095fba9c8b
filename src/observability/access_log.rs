//! Access log: one tab-separated line per connection.
//!
//! # Responsibilities
//! - Format log entries (`time`, client address, status, URL)
//! - Funnel records from every connection task to a single writer
//!
//! # Design Decisions
//! - Bounded queue with a bounded send wait; a stalled disk drops records
//!   instead of stalling connections
//! - Each line is written with one `write_all`, so lines never interleave

use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 256;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub remote_addr: IpAddr,
    /// Status of the header sent, `None` when nothing was sent.
    pub status: Option<u8>,
    /// Request URL, `None` when the request line never arrived.
    pub request_url: Option<String>,
}

impl LogEntry {
    pub fn new(remote_addr: IpAddr) -> Self {
        Self {
            time: Utc::now(),
            remote_addr,
            status: None,
            request_url: None,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t",
            self.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.remote_addr
        )?;
        match self.status {
            Some(status) => write!(f, "{status}")?,
            None => f.write_str("-")?,
        }
        write!(f, "\t{}", self.request_url.as_deref().unwrap_or("-"))
    }
}

/// Producer handle, cloned into every connection task.
#[derive(Debug, Clone)]
pub struct AccessLogSender {
    tx: mpsc::Sender<LogEntry>,
}

impl AccessLogSender {
    /// Queue an entry. Drops it with a warning if the writer is gone or stalled.
    pub async fn record(&self, entry: LogEntry) {
        if let Err(e) = self.tx.send_timeout(entry, SEND_TIMEOUT).await {
            tracing::warn!(error = %e, "Dropped access log record");
        }
    }
}

/// A queue whose receiving end is handed back to the caller.
pub fn channel(capacity: usize) -> (AccessLogSender, mpsc::Receiver<LogEntry>) {
    let (tx, rx) = mpsc::channel(capacity);
    (AccessLogSender { tx }, rx)
}

/// Open (or create) the access log file and start its writer task.
///
/// The task ends once every sender has been dropped and the queue drained.
pub async fn open(path: &Path) -> std::io::Result<(AccessLogSender, JoinHandle<()>)> {
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    let (sender, rx) = channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(write_entries(rx, file));
    Ok((sender, handle))
}

async fn write_entries<W>(mut rx: mpsc::Receiver<LogEntry>, mut sink: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(entry) = rx.recv().await {
        let line = format!("{entry}\n");
        if let Err(e) = sink.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "Failed to write access log");
        }
    }
    if let Err(e) = sink.flush().await {
        tracing::error!(error = %e, "Failed to flush access log");
    }
}
