// Reading partitions back
//
// Files may have been touched by other processes, so nothing here trusts the
// shape of a file: rows that do not match the expected header are skipped and
// counted instead of failing the whole read.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

use super::error::{LogResult, LogStoreError};
use super::partition::{EventKind, PartitionId};
use super::records::LogRecord;

/// Records recovered from one partition file
#[derive(Debug, Clone, Serialize)]
pub struct LogScan<R> {
    pub partition: PartitionId,
    pub records: Vec<R>,
    /// Rows skipped because they did not match the schema
    pub malformed: usize,
}

/// Read every well-formed record of one partition.
///
/// A missing partition reads as empty.
pub fn read_partition<R: LogRecord>(log_dir: &Path, partition: &PartitionId) -> LogResult<LogScan<R>> {
    let path = log_dir.join(partition.file_name());
    let mut scan = LogScan {
        partition: partition.clone(),
        records: Vec::new(),
        malformed: 0,
    };

    if !path.exists() {
        return Ok(scan);
    }

    let read_err = |source: csv::Error| LogStoreError::Read {
        path: path.clone(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(&path)
        .map_err(read_err)?;

    let headers = reader.headers().map_err(read_err)?.clone();
    let header_ok = headers.iter().eq(R::HEADER.iter().copied());
    if !header_ok {
        warn!(
            path = %path.display(),
            found = ?headers,
            "Partition header does not match schema, skipping all rows"
        );
    }

    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(read_err(e)),
            Err(e) => {
                warn!(path = %path.display(), row, error = %e, "Skipping unreadable row");
                scan.malformed += 1;
                continue;
            }
        };

        if !header_ok {
            scan.malformed += 1;
            continue;
        }
        if record.len() != R::HEADER.len() {
            warn!(
                path = %path.display(),
                row,
                columns = record.len(),
                "Skipping row with wrong column count"
            );
            scan.malformed += 1;
            continue;
        }

        match record.deserialize::<R>(Some(&headers)) {
            Ok(parsed) => scan.records.push(parsed),
            Err(e) => {
                warn!(path = %path.display(), row, error = %e, "Skipping unparseable row");
                scan.malformed += 1;
            }
        }
    }

    Ok(scan)
}

/// Partitions present in the log directory, optionally of one kind, sorted
pub fn list_partitions(log_dir: &Path, kind: Option<EventKind>) -> LogResult<Vec<PartitionId>> {
    let io_err = |source: io::Error| LogStoreError::Io {
        path: log_dir.to_path_buf(),
        source,
    };

    let mut partitions: Vec<PartitionId> = fs::read_dir(log_dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| PartitionId::from_file_name(&entry.file_name().to_string_lossy()))
        .filter(|p| kind.map_or(true, |k| p.kind() == Some(k)))
        .collect();

    partitions.sort();
    Ok(partitions)
}

/// Aggregate view over every partition of one kind
#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub kind: EventKind,
    pub partitions: Vec<PartitionId>,
    pub records: usize,
    pub malformed: usize,
    pub model_versions: BTreeSet<String>,
    /// Record count per tag (train) or country (predict)
    pub segments: BTreeMap<String, usize>,
    /// Epoch seconds of the newest record
    pub latest_timestamp: Option<f64>,
}

/// Summarize the monthly partitions of one kind; the test partition is only
/// counted when `include_test` is set.
pub fn summarize<R: LogRecord>(log_dir: &Path, include_test: bool) -> LogResult<LogSummary> {
    let partitions: Vec<PartitionId> = list_partitions(log_dir, Some(R::KIND))?
        .into_iter()
        .filter(|p| include_test || !p.is_test())
        .collect();
    let mut summary = LogSummary {
        kind: R::KIND,
        partitions: partitions.clone(),
        records: 0,
        malformed: 0,
        model_versions: BTreeSet::new(),
        segments: BTreeMap::new(),
        latest_timestamp: None,
    };

    for partition in &partitions {
        let scan = read_partition::<R>(log_dir, partition)?;
        summary.records += scan.records.len();
        summary.malformed += scan.malformed;

        for record in &scan.records {
            summary.model_versions.insert(record.model_version().to_string());
            *summary
                .segments
                .entry(record.segment().to_string())
                .or_insert(0) += 1;
            summary.latest_timestamp = Some(
                summary
                    .latest_timestamp
                    .map_or(record.timestamp(), |t| t.max(record.timestamp())),
            );
        }
    }

    Ok(summary)
}
