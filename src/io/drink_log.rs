//! Drink log - appends every registered drink to a JSONL file
//!
//! The API hands entries to a bounded channel with `try_send` so a slow
//! disk never delays a registration; a writer task drains the channel.
//! This is an audit trail only, the ledger is never rebuilt from it.

use crate::domain::GuestRecord;
use crate::infra::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// One line of the drink log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkEntry {
    pub code: String,
    pub name: String,
    pub consumed: u32,
    pub allowance: u32,
    /// RFC 3339 UTC
    pub ts: String,
}

impl DrinkEntry {
    pub fn from_record(record: &GuestRecord) -> Self {
        Self {
            code: record.code.to_string(),
            name: record.display_name(),
            consumed: record.consumed,
            allowance: record.allowance,
            ts: utc_timestamp(),
        }
    }
}

/// Current UTC time as RFC 3339 (`...Z`)
fn utc_timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|e| {
        warn!(error = %e, "drink_log_timestamp_failed");
        String::new()
    })
}

/// Non-blocking handle used by the API
#[derive(Clone)]
pub struct DrinkLogSender {
    tx: mpsc::Sender<DrinkEntry>,
    metrics: Arc<Metrics>,
}

impl DrinkLogSender {
    /// Queue a registered drink; drops (and counts) when the writer lags
    pub fn send(&self, record: &GuestRecord) {
        match self.tx.try_send(DrinkEntry::from_record(record)) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                self.metrics.record_drink_log_dropped();
                warn!(code = %entry.code, "drink_log_channel_full");
            }
            Err(TrySendError::Closed(entry)) => {
                debug!(code = %entry.code, "drink_log_closed");
            }
        }
    }
}

/// Writer task draining the channel into the log file
pub struct DrinkLogWriter {
    file_path: String,
    rx: mpsc::Receiver<DrinkEntry>,
}

impl DrinkLogWriter {
    /// Run until every sender is dropped
    pub async fn run(mut self) {
        info!(file_path = %self.file_path, "drink_log_started");

        while let Some(entry) = self.rx.recv().await {
            self.write_entry(&entry);
        }

        info!("drink_log_stopped");
    }

    /// Write one entry, returns true on success
    pub fn write_entry(&self, entry: &DrinkEntry) -> bool {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                error!(code = %entry.code, error = %e, "drink_log_encode_failed");
                return false;
            }
        };

        match self.append_line(&line) {
            Ok(()) => true,
            Err(e) => {
                error!(code = %entry.code, error = %e, "drink_log_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "drink_log_written");

        Ok(())
    }
}

/// Create the drink log channel
///
/// Returns the sender (for the API) and the writer (to be spawned)
pub fn create_drink_log(
    file_path: &str,
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (DrinkLogSender, DrinkLogWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let sender = DrinkLogSender { tx, metrics };
    let writer = DrinkLogWriter { file_path: file_path.to_string(), rx };
    (sender, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GuestCode;
    use std::fs;
    use tempfile::tempdir;

    fn record(consumed: u32) -> GuestRecord {
        let code: GuestCode = "ABC123".parse().unwrap();
        GuestRecord::new(code, Some("João Silva"), 3).with_consumed(consumed)
    }

    #[test]
    fn test_entry_from_record() {
        let entry = DrinkEntry::from_record(&record(2));
        assert_eq!(entry.code, "ABC123");
        assert_eq!(entry.name, "João Silva");
        assert_eq!(entry.consumed, 2);
        assert_eq!(entry.allowance, 3);
        assert!(entry.ts.ends_with('Z'));
        assert!(OffsetDateTime::parse(&entry.ts, &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn test_writer_appends_jsonl() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("logs").join("drinks.jsonl");
        let metrics = Arc::new(Metrics::new());

        let (sender, writer) = create_drink_log(file_path.to_str().unwrap(), 8, metrics);
        sender.send(&record(1));
        sender.send(&record(2));
        drop(sender);
        writer.run().await;

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: DrinkEntry = serde_json::from_str(lines[0]).unwrap();
        let second: DrinkEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first.consumed, 1);
        assert_eq!(second.consumed, 2);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_full_channel_counts_drops() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("drinks.jsonl");
        let metrics = Arc::new(Metrics::new());

        let (sender, _writer) = create_drink_log(file_path.to_str().unwrap(), 1, metrics.clone());
        sender.send(&record(1));
        sender.send(&record(2));
        sender.send(&record(3));

        assert_eq!(metrics.drink_log_dropped(), 2);
    }
}
