//! Append-only CSV log of scan results
//!
//! One record per logged read:
//! `timestamp,sector_<n>,latency_ms,category,notes` with `-1` as the
//! latency of failed reads. Records are flushed as they are written so the
//! file stays meaningful if the scan is interrupted. A write failure
//! disables further logging but never stops the scan.

use crate::taxonomy::Category;
use chrono::Local;
use log::warn;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER: &str = "timestamp,sector,latency_ms,category,notes\n";

/// Scan log sink; silently disabled when no path was given or after a
/// write failure.
pub struct ScanLog {
    writer: Option<BufWriter<File>>,
}

impl ScanLog {
    /// Disabled sink that drops all records.
    pub fn disabled() -> Self {
        ScanLog { writer: None }
    }

    /// Create the log file at `path`. Creation failure only disables
    /// logging.
    pub fn create(path: &Path) -> Self {
        match File::create(path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                if let Err(e) = writer.write_all(HEADER.as_bytes()) {
                    warn!("cannot write log header to {}: {}", path.display(), e);
                    return ScanLog { writer: None };
                }
                ScanLog {
                    writer: Some(writer),
                }
            }
            Err(e) => {
                warn!("cannot create log file {}: {}", path.display(), e);
                ScanLog { writer: None }
            }
        }
    }

    /// Whether records are currently being written.
    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    /// Append one record. `latency_ms = None` logs the error marker `-1`.
    pub fn record(&mut self, sector: u64, latency_ms: Option<u64>, category: Category, notes: &str) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let latency = match latency_ms {
            Some(ms) => ms as i64,
            None => -1,
        };
        let result = writeln!(
            writer,
            "{},sector_{},{},{},{}",
            timestamp, sector, latency, category, notes
        )
        .and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!("log write failed, disabling scan log: {}", e);
            self.writer = None;
        }
    }

    /// Flush and close the sink.
    pub fn finish(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
        self.writer = None;
    }
}

impl Drop for ScanLog {
    fn drop(&mut self) {
        self.finish();
    }
}
