// Event log store errors

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogStoreError {
    /// Log directory missing, not creatable or not writable
    #[error("log directory {} is not usable: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another writer held the partition lock for longer than the bounded wait
    #[error("timed out after {waited:?} waiting for the lock on {}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("failed to append to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A field would have split the record across physical lines
    #[error("record {unique_id} contains a line break and was not written")]
    LineBreak { unique_id: String },

    #[error("failed to encode log record: {0}")]
    Encode(#[from] csv::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl LogStoreError {
    /// Whether a caller may reasonably retry the same append later
    pub fn is_transient(&self) -> bool {
        matches!(self, LogStoreError::LockTimeout { .. })
    }
}

pub type LogResult<T> = Result<T, LogStoreError>;
