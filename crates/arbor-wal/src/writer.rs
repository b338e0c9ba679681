//! WAL writer for appending log records.

use crate::record::{LogRecord, LogRecordType, Lsn};
use arbor_common::{ArborError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// File name of the on-disk log inside `wal_dir`.
pub const WAL_FILE_NAME: &str = "arbor.wal";

/// Configuration for the WAL writer.
#[derive(Debug, Clone)]
pub struct WalWriterConfig {
    /// Directory for the log file. `None` keeps the log in memory only.
    pub wal_dir: Option<PathBuf>,
    /// Enable fsync after each write.
    pub fsync_enabled: bool,
}

impl Default for WalWriterConfig {
    fn default() -> Self {
        Self {
            wal_dir: None,
            fsync_enabled: true,
        }
    }
}

struct WalState {
    /// Records appended so far, in LSN order.
    records: Vec<LogRecord>,
    /// Open log file, when the log is persisted.
    file: Option<File>,
}

/// Thread-safe WAL writer.
///
/// Assigns LSNs, retains appended records and, when configured with a
/// directory, writes them to a single append-only log file.
pub struct WalWriter {
    /// Configuration.
    config: WalWriterConfig,
    /// Next LSN to assign.
    next_lsn: AtomicU64,
    /// Last flushed LSN.
    flushed_lsn: AtomicU64,
    /// Retained records and file handle. Appends are serialized here so the
    /// file order matches LSN order.
    state: Mutex<WalState>,
}

impl WalWriter {
    /// Creates a new WAL writer.
    ///
    /// If the configured log file already exists, positions are continued
    /// from its end.
    pub fn new(config: WalWriterConfig) -> Result<Self> {
        let mut next_lsn = Lsn::FIRST;
        let mut records = Vec::new();
        let mut file = None;

        if let Some(dir) = &config.wal_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(WAL_FILE_NAME);
            if path.exists() {
                records = LogRecord::parse_all(&std::fs::read(&path)?)?;
                if let Some(last) = records.last() {
                    next_lsn = last.end_lsn();
                }
            }
            file = Some(OpenOptions::new().create(true).append(true).open(&path)?);
        }

        Ok(Self {
            config,
            next_lsn: AtomicU64::new(next_lsn.0),
            flushed_lsn: AtomicU64::new(0),
            state: Mutex::new(WalState { records, file }),
        })
    }

    /// Creates a writer that keeps the log in memory only.
    pub fn in_memory() -> Self {
        Self {
            config: WalWriterConfig {
                wal_dir: None,
                fsync_enabled: false,
            },
            next_lsn: AtomicU64::new(Lsn::FIRST.0),
            flushed_lsn: AtomicU64::new(0),
            state: Mutex::new(WalState {
                records: Vec::new(),
                file: None,
            }),
        }
    }

    /// Returns the path of the on-disk log, if any.
    pub fn wal_path(&self) -> Option<PathBuf> {
        self.config.wal_dir.as_ref().map(|d| d.join(WAL_FILE_NAME))
    }

    /// Returns the current insert position: the LSN the next record will get.
    pub fn insert_position(&self) -> Lsn {
        Lsn(self.next_lsn.load(Ordering::SeqCst))
    }

    /// Returns the last flushed LSN.
    pub fn flushed_lsn(&self) -> Lsn {
        Lsn(self.flushed_lsn.load(Ordering::SeqCst))
    }

    /// Appends a record and returns the position just past it.
    ///
    /// The returned LSN is the value to stamp on the pages the record
    /// describes.
    pub fn append(&self, record_type: LogRecordType, payload: Bytes) -> Result<Lsn> {
        if payload.len() > LogRecord::MAX_PAYLOAD_SIZE {
            return Err(ArborError::WalWriteFailed(format!(
                "payload too large: {} bytes",
                payload.len()
            )));
        }

        let mut state = self.state.lock();
        let start = self.insert_position();
        let record = LogRecord::new(start, record_type, payload);
        let end = record.end_lsn();

        if let Some(file) = state.file.as_mut() {
            file.write_all(&record.serialize())
                .map_err(|e| ArborError::WalWriteFailed(e.to_string()))?;
            if self.config.fsync_enabled {
                file.sync_data()?;
                self.flushed_lsn.store(end.0, Ordering::SeqCst);
            }
        }

        state.records.push(record);
        self.next_lsn.store(end.0, Ordering::SeqCst);
        Ok(end)
    }

    /// Forces the log to stable storage.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.as_mut() {
            file.flush()?;
            file.sync_data()?;
        }
        self.flushed_lsn
            .store(self.next_lsn.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }

    /// Returns a copy of every record appended so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.state.lock().records.clone()
    }

    /// Returns the number of records appended so far.
    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }
}

/// Source of fake LSNs for relations that are not WAL-logged.
///
/// Values increase monotonically so they serve the same ordering purpose
/// as real insert positions.
#[derive(Debug)]
pub struct FakeLsnSource {
    counter: AtomicU64,
}

impl FakeLsnSource {
    /// Creates a source whose first value is [`Lsn::FIRST`].
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(Lsn::FIRST.0),
        }
    }

    /// Returns a fresh LSN, strictly greater than every previous one.
    pub fn next(&self) -> Lsn {
        Lsn(self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for FakeLsnSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_in_memory_append() {
        let writer = WalWriter::in_memory();
        let start = writer.insert_position();
        assert_eq!(start, Lsn::FIRST);

        let end = writer
            .append(LogRecordType::GistPageUpdate, Bytes::from_static(b"x"))
            .unwrap();

        assert!(end > start);
        assert_eq!(writer.insert_position(), end);
        assert_eq!(writer.record_count(), 1);
        assert_eq!(writer.records()[0].lsn, start);
        assert!(writer.wal_path().is_none());
    }

    #[test]
    fn test_append_positions_increase() {
        let writer = WalWriter::in_memory();
        let mut last = writer.insert_position();

        for i in 0..10u8 {
            let end = writer
                .append(LogRecordType::GistPageDelete, Bytes::from(vec![i; i as usize]))
                .unwrap();
            assert!(end > last);
            last = end;
        }
    }

    #[test]
    fn test_append_rejects_oversized_payload() {
        let writer = WalWriter::in_memory();
        let payload = Bytes::from(vec![0u8; LogRecord::MAX_PAYLOAD_SIZE + 1]);

        let result = writer.append(LogRecordType::GistPageUpdate, payload);
        assert!(matches!(result, Err(ArborError::WalWriteFailed(_))));
        assert_eq!(writer.record_count(), 0);
    }

    #[test]
    fn test_on_disk_append_and_reopen() {
        let dir = tempdir().unwrap();
        let config = WalWriterConfig {
            wal_dir: Some(dir.path().to_path_buf()),
            fsync_enabled: true,
        };

        let end = {
            let writer = WalWriter::new(config.clone()).unwrap();
            writer
                .append(LogRecordType::GistPageUpdate, Bytes::from_static(b"one"))
                .unwrap();
            let end = writer
                .append(LogRecordType::GistPageDelete, Bytes::from_static(b"two"))
                .unwrap();
            assert_eq!(writer.flushed_lsn(), end);
            end
        };

        let writer = WalWriter::new(config).unwrap();
        assert_eq!(writer.insert_position(), end);
        assert_eq!(writer.record_count(), 2);
    }

    #[test]
    fn test_flush_advances_flushed_lsn() {
        let dir = tempdir().unwrap();
        let writer = WalWriter::new(WalWriterConfig {
            wal_dir: Some(dir.path().to_path_buf()),
            fsync_enabled: false,
        })
        .unwrap();

        let end = writer
            .append(LogRecordType::GistPageUpdate, Bytes::new())
            .unwrap();
        assert_eq!(writer.flushed_lsn(), Lsn::INVALID);

        writer.flush().unwrap();
        assert_eq!(writer.flushed_lsn(), end);
    }

    #[test]
    fn test_fake_lsn_source() {
        let source = FakeLsnSource::new();

        let a = source.next();
        let b = source.next();
        assert_eq!(a, Lsn::FIRST);
        assert!(b > a);
        assert!(source.next() > b);
    }

    #[test]
    fn test_concurrent_appends_unique_positions() {
        let writer = WalWriter::in_memory();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        writer
                            .append(LogRecordType::GistPageUpdate, Bytes::from_static(b"p"))
                            .unwrap();
                    }
                });
            }
        });

        let records = writer.records();
        assert_eq!(records.len(), 200);
        for pair in records.windows(2) {
            assert_eq!(pair[0].end_lsn(), pair[1].lsn);
        }
    }
}
