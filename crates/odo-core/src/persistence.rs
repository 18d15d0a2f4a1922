//! Durable per-run sample log.
//!
//! One CSV file per run, named after a base name with a numeric suffix so a
//! previous run is never overwritten. Each row is flushed and synced before
//! `append` returns.

use crate::sample::{Reading, Sample};
use crate::tags;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot create log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write to log file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sample does not match the {layout:?} log layout")]
    LayoutMismatch { layout: LogLayout },
}

/// Column layout, fixed by the sample source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLayout {
    /// `Timestamp,RPM,Speed (cm/s)`
    Pulse,
    /// `Timestamp,Speed`
    Serial,
}

impl LogLayout {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            LogLayout::Pulse => &[
                tags::TIMESTAMP.csv_header,
                tags::RPM.csv_header,
                tags::SPEED_CM_S.csv_header,
            ],
            LogLayout::Serial => &[tags::TIMESTAMP.csv_header, tags::SERIAL_SPEED.csv_header],
        }
    }
}

/// One persisted row.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Pulse {
        timestamp: String,
        rpm: f64,
        speed_cm_s: f64,
    },
    Serial {
        timestamp: String,
        speed_cm_s: f64,
    },
}

impl From<&Sample> for LogEntry {
    fn from(sample: &Sample) -> Self {
        let timestamp = sample.formatted_timestamp();
        match sample.reading() {
            Reading::Pulse { rpm, speed_cm_s } => LogEntry::Pulse {
                timestamp,
                rpm,
                speed_cm_s,
            },
            Reading::Serial { speed_cm_s } => LogEntry::Serial {
                timestamp,
                speed_cm_s,
            },
        }
    }
}

impl LogEntry {
    fn fits(&self, layout: LogLayout) -> bool {
        matches!(
            (self, layout),
            (LogEntry::Pulse { .. }, LogLayout::Pulse) | (LogEntry::Serial { .. }, LogLayout::Serial)
        )
    }

    fn record(&self) -> Vec<String> {
        match self {
            LogEntry::Pulse {
                timestamp,
                rpm,
                speed_cm_s,
            } => vec![timestamp.clone(), rpm.to_string(), speed_cm_s.to_string()],
            LogEntry::Serial {
                timestamp,
                speed_cm_s,
            } => vec![timestamp.clone(), speed_cm_s.to_string()],
        }
    }
}

/// `base.csv`, then `base 1.csv`, `base 2.csv`, ... in `dir`.
pub fn next_available_path(dir: &Path, base_name: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{base_name}.csv"));
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{base_name} {counter}.csv"));
        counter += 1;
    }
    candidate
}

pub struct CsvLog {
    path: PathBuf,
    layout: LogLayout,
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

impl CsvLog {
    /// Creates a fresh log in `dir`, picking the first free file name.
    pub fn open(dir: &Path, base_name: &str, layout: LogLayout) -> Result<Self, LogError> {
        std::fs::create_dir_all(dir).map_err(|source| LogError::Open {
            path: dir.to_path_buf(),
            source,
        })?;

        // create_new closes the race with another process picking the same name.
        loop {
            let path = next_available_path(dir, base_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Self::with_file(path, file, layout),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(LogError::Open { path, source }),
            }
        }
    }

    fn with_file(path: PathBuf, file: File, layout: LogLayout) -> Result<Self, LogError> {
        let mut log = Self {
            path,
            layout,
            writer: Some(csv::Writer::from_writer(file)),
            rows: 0,
        };
        let header: Vec<String> = layout.header().iter().map(|h| h.to_string()).collect();
        log.write_record(&header)?;
        info!(path = %log.path.display(), ?layout, "Sample log opened");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> LogLayout {
        self.layout
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        if !entry.fits(self.layout) {
            return Err(LogError::LayoutMismatch {
                layout: self.layout,
            });
        }
        self.write_record(&entry.record())?;
        self.rows += 1;
        debug!(rows = self.rows, "Row appended");
        Ok(())
    }

    pub fn append_sample(&mut self, sample: &Sample) -> Result<(), LogError> {
        self.append(&LogEntry::from(sample))
    }

    fn write_record(&mut self, record: &[String]) -> Result<(), LogError> {
        let path = &self.path;
        let writer = self.writer.as_mut().ok_or_else(|| LogError::Write {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "log already closed"),
        })?;
        let to_write_err = |source: io::Error| LogError::Write {
            path: path.clone(),
            source,
        };

        writer
            .write_record(record)
            .map_err(|e| to_write_err(io::Error::other(e)))?;
        writer.flush().map_err(to_write_err)?;
        writer.get_ref().sync_data().map_err(to_write_err)
    }

    /// Flushes and releases the file. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), LogError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let to_write_err = |source: io::Error| LogError::Write {
            path: self.path.clone(),
            source,
        };
        writer.flush().map_err(to_write_err)?;
        let file = writer
            .into_inner()
            .map_err(|e| to_write_err(io::Error::other(e.to_string())))?;
        file.sync_all().map_err(to_write_err)?;
        info!(path = %self.path.display(), rows = self.rows, "Sample log closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl Drop for CsvLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close sample log");
        }
    }
}
