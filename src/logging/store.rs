// Event log store
//
// Appends train/predict records to month-partitioned CSV files. Each append
// is one critical section under an exclusive advisory lock on the partition
// file: decide whether the header is needed, encode header + record into one
// buffer, write it with a single call, sync, release.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::error::{LogResult, LogStoreError};
use super::partition::{resolve, PartitionId};
use super::records::{
    new_unique_id, LogRecord, PredictEvent, PredictPayload, TrainEvent, TrainPayload,
};

/// Default bounded wait for a partition lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between lock attempts while another writer holds the partition
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory holding every partition file
    pub log_dir: PathBuf,
    /// How long an append waits for a contended partition before giving up
    pub lock_timeout: Duration,
}

impl StoreConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

pub struct EventLogStore {
    log_dir: PathBuf,
    lock_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl EventLogStore {
    /// Open the store, creating the log directory if needed.
    ///
    /// Safe to call on every startup; an existing directory is left as is.
    pub fn open(config: StoreConfig) -> LogResult<Self> {
        ensure_storage_ready(&config.log_dir)?;
        info!(log_dir = %config.log_dir.display(), "Event log store ready");

        Ok(Self {
            log_dir: config.log_dir,
            lock_timeout: config.lock_timeout,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source used by `record_*`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn partition_path(&self, partition: &PartitionId) -> PathBuf {
        self.log_dir.join(partition.file_name())
    }

    /// Append a train event stamped with the store's clock
    pub fn record_train(&self, payload: &TrainPayload, is_test: bool) -> LogResult<TrainEvent> {
        self.append_train(payload, is_test, self.clock.now())
    }

    /// Append a predict event stamped with the store's clock
    pub fn record_predict(
        &self,
        payload: &PredictPayload,
        is_test: bool,
    ) -> LogResult<PredictEvent> {
        self.append_predict(payload, is_test, self.clock.now())
    }

    /// Append one train event to the partition selected by `is_test` and `now`.
    ///
    /// Returns the record exactly as written.
    pub fn append_train(
        &self,
        payload: &TrainPayload,
        is_test: bool,
        now: DateTime<Utc>,
    ) -> LogResult<TrainEvent> {
        let event = TrainEvent::from_payload(payload, new_unique_id(), now);
        self.append(is_test, now, &event)?;
        Ok(event)
    }

    /// Append one predict event to the partition selected by `is_test` and `now`.
    pub fn append_predict(
        &self,
        payload: &PredictPayload,
        is_test: bool,
        now: DateTime<Utc>,
    ) -> LogResult<PredictEvent> {
        let event = PredictEvent::from_payload(payload, new_unique_id(), now);
        self.append(is_test, now, &event)?;
        Ok(event)
    }

    fn append<R: LogRecord>(&self, is_test: bool, now: DateTime<Utc>, record: &R) -> LogResult<()> {
        let partition = resolve(R::KIND, is_test, now.date_naive());
        let path = self.partition_path(&partition);
        let io_err = |source: io::Error| LogStoreError::Io {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;

        // Held until `file` is dropped, on every return path
        self.lock_partition(&file, &path)?;

        let len = file.metadata().map_err(io_err)?.len();
        let row = encode_row(record, &io_err)?;
        let mut buf = Vec::with_capacity(row.len() + 128);

        // A writer that died mid-line leaves an unterminated tail; close any
        // quote it left open and start on a fresh line so the torn fragment
        // stays a single row of its own
        if len > 0 {
            match tail_state(&mut file, len).map_err(io_err)? {
                Tail::Clean => {}
                Tail::OpenLine => buf.push(b'\n'),
                Tail::OpenQuote => buf.extend_from_slice(b"\"\n"),
            }
        }

        if len == 0 {
            let mut header = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut buf);
            header.write_record(R::HEADER)?;
            header.flush().map_err(io_err)?;
        }
        buf.extend_from_slice(&row);

        file.write_all(&buf).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;

        debug!(
            partition = %partition,
            unique_id = record.unique_id(),
            header = len == 0,
            "Appended log record"
        );

        Ok(())
    }

    /// Take the exclusive partition lock, polling until `lock_timeout` elapses
    fn lock_partition(&self, file: &File, path: &Path) -> LogResult<()> {
        let start = Instant::now();

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if is_contended(&e) => {
                    let waited = start.elapsed();
                    if waited >= self.lock_timeout {
                        return Err(LogStoreError::LockTimeout {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(LogStoreError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }
}

/// Create the log directory if absent and check it can take writes.
///
/// Idempotent: an existing, writable directory is a no-op.
pub fn ensure_storage_ready(log_dir: &Path) -> LogResult<()> {
    let storage_err = |source: io::Error| LogStoreError::Storage {
        path: log_dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(log_dir).map_err(storage_err)?;

    let metadata = fs::metadata(log_dir).map_err(storage_err)?;
    if !metadata.is_dir() {
        return Err(storage_err(io::Error::new(
            io::ErrorKind::Other,
            "path exists and is not a directory",
        )));
    }
    if metadata.permissions().readonly() {
        return Err(storage_err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "directory is read-only",
        )));
    }

    Ok(())
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Encode one record as exactly one newline-terminated line.
///
/// Fields containing line breaks are rejected rather than quoted across
/// lines, so every physical line of a partition is one record.
fn encode_row<R: LogRecord>(
    record: &R,
    io_err: impl Fn(io::Error) -> LogStoreError,
) -> LogResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(256));
    writer.serialize(record)?;
    let row = writer.into_inner().map_err(|e| io_err(e.into_error()))?;

    let body = row.strip_suffix(b"\n").unwrap_or(&row);
    if body.iter().any(|b| matches!(b, b'\n' | b'\r')) {
        return Err(LogStoreError::LineBreak {
            unique_id: record.unique_id().to_string(),
        });
    }

    Ok(row)
}

/// How the file ends, as seen by the next appender
#[derive(Debug, PartialEq, Eq)]
enum Tail {
    /// Ends with a newline
    Clean,
    /// Unterminated line with balanced quotes
    OpenLine,
    /// Unterminated line inside a quoted field
    OpenQuote,
}

const TAIL_CHUNK: u64 = 4096;

/// Inspect the last physical line. Quote parity since the last newline tells
/// whether a crash left a quoted field open (escaped quotes come in pairs).
fn tail_state(file: &mut File, len: u64) -> io::Result<Tail> {
    let mut end = len;
    let mut quotes = 0usize;
    let mut chunk = Vec::with_capacity(TAIL_CHUNK as usize);

    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        chunk.resize((end - start) as usize, 0);
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;

        if end == len && chunk.last() == Some(&b'\n') {
            return Ok(Tail::Clean);
        }

        match chunk.iter().rposition(|&b| b == b'\n') {
            Some(pos) => {
                quotes += chunk[pos + 1..].iter().filter(|&&b| b == b'"').count();
                break;
            }
            None => quotes += chunk.iter().filter(|&&b| b == b'"').count(),
        }
        end = start;
    }

    Ok(if quotes % 2 == 1 {
        Tail::OpenQuote
    } else {
        Tail::OpenLine
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::clock::FixedClock;
    use crate::logging::reader::read_partition;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn train_payload(tag: &str) -> TrainPayload {
        TrainPayload {
            tag: tag.to_string(),
            period: "(100,10)".to_string(),
            rmse: "{'rmse':0.5}".to_string(),
            runtime: "00:00:01".to_string(),
            model_version: "0.1".to_string(),
            model_version_note: "test".to_string(),
        }
    }

    fn store_in(dir: &TempDir) -> EventLogStore {
        EventLogStore::open(StoreConfig::new(dir.path().join("logfiles"))).unwrap()
    }

    fn march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path().join("a").join("b"));

        EventLogStore::open(config.clone()).unwrap();
        EventLogStore::open(config.clone()).unwrap();
        assert!(config.log_dir.is_dir());
    }

    #[test]
    fn test_open_fails_when_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-a-dir");
        fs::write(&path, "x").unwrap();

        let err = EventLogStore::open(StoreConfig::new(&path)).err().unwrap();
        assert!(matches!(err, LogStoreError::Storage { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for tag in ["a", "b", "c"] {
            store.append_train(&train_payload(tag), false, march()).unwrap();
        }

        let path = store.log_dir().join("train-2024-03.log");
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], TrainEvent::HEADER.join(","));
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("unique_id,")).count(),
            1
        );
    }

    #[test]
    fn test_record_uses_injected_clock() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 59).unwrap(),
        )));

        let event = store.record_train(&train_payload("all"), false).unwrap();

        assert_eq!(event.timestamp, 1_577_836_799.0);
        assert!(store.log_dir().join("train-2019-12.log").exists());
    }

    #[test]
    fn test_unterminated_tail_does_not_swallow_next_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_train(&train_payload("first"), true, march()).unwrap();

        let path = store.log_dir().join("train-test.log");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"partial,row").unwrap();
        drop(file);

        store.append_train(&train_payload("second"), true, march()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "partial,row");
        assert!(lines[3].contains(",second,"));
    }

    #[test]
    fn test_torn_quoted_field_does_not_swallow_later_records() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_train(&train_payload("first"), true, march()).unwrap();

        let path = store.log_dir().join("train-test.log");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"deadbeef,1.0,torn,\"(100,").unwrap();
        drop(file);

        for tag in ["second", "third", "fourth"] {
            store.append_train(&train_payload(tag), true, march()).unwrap();
        }

        let partition: PartitionId = "train-test".parse().unwrap();
        let scan = read_partition::<TrainEvent>(store.log_dir(), &partition).unwrap();
        let tags: Vec<&str> = scan.records.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["first", "second", "third", "fourth"]);
        assert_eq!(scan.malformed, 1);
    }

    #[test]
    fn test_tail_state_tracks_quote_parity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tail.log");
        let check = |contents: &[u8]| {
            fs::write(&path, contents).unwrap();
            let mut file = File::open(&path).unwrap();
            tail_state(&mut file, contents.len() as u64).unwrap()
        };

        assert_eq!(check(b"a,b\n"), Tail::Clean);
        assert_eq!(check(b"a,b\nc,\"d,e\""), Tail::OpenLine);
        assert_eq!(check(b"a,\"x\"\nc,\"d,"), Tail::OpenQuote);
        assert_eq!(check(b"c,\"say \"\"hi"), Tail::OpenQuote);

        let mut long = b"h\n\"".to_vec();
        long.extend(std::iter::repeat(b'x').take(10_000));
        assert_eq!(check(&long), Tail::OpenQuote);
    }

    #[test]
    fn test_line_breaks_in_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_train(&train_payload("ok"), true, march()).unwrap();

        let mut payload = train_payload("bad");
        payload.model_version_note = "two\nlines".to_string();
        let err = store.append_train(&payload, true, march()).unwrap_err();
        assert!(matches!(err, LogStoreError::LineBreak { .. }));

        let contents = fs::read_to_string(store.log_dir().join("train-test.log")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_lock_timeout_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.lock_timeout = Duration::from_millis(50);

        let path = store.log_dir().join("train-test.log");
        let holder = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        holder.lock_exclusive().unwrap();

        let err = store
            .append_train(&train_payload("blocked"), true, march())
            .unwrap_err();
        assert!(matches!(err, LogStoreError::LockTimeout { .. }));
        assert!(err.is_transient());

        drop(holder);
        store.append_train(&train_payload("after"), true, march()).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
