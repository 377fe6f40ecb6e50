// Partition resolution for event log files
//
// Production traffic rolls over to a new file every calendar month; test
// traffic always lands in one fixed file per event kind.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix shared by every partition file.
pub const LOG_FILE_EXTENSION: &str = "log";

/// Event kind, each with its own fixed schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Train,
    Predict,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Train => "train",
            EventKind::Predict => "predict",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(EventKind::Train),
            "predict" => Ok(EventKind::Predict),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Stable identity of one log file, e.g. `train-2024-03` or `predict-test`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name inside the log directory
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, LOG_FILE_EXTENSION)
    }

    /// Kind encoded in the identifier prefix
    pub fn kind(&self) -> Option<EventKind> {
        let (prefix, _) = self.0.split_once('-')?;
        prefix.parse().ok()
    }

    pub fn is_test(&self) -> bool {
        self.0.ends_with("-test")
    }

    /// Recover a partition from a file name produced by [`PartitionId::file_name`].
    ///
    /// Returns `None` for files that were not written by the log store.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(&format!(".{}", LOG_FILE_EXTENSION))?;
        let (prefix, rest) = stem.split_once('-')?;
        prefix.parse::<EventKind>().ok()?;

        let well_formed = rest == "test" || is_year_month(rest);
        well_formed.then(|| Self(stem.to_string()))
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PartitionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_file_name(&format!("{s}.{LOG_FILE_EXTENSION}"))
            .ok_or_else(|| format!("not a log partition: {s}"))
    }
}

fn is_year_month(s: &str) -> bool {
    let Some((year, month)) = s.split_once('-') else {
        return false;
    };
    year.len() == 4
        && month.len() == 2
        && year.chars().all(|c| c.is_ascii_digit())
        && matches!(month.parse::<u32>(), Ok(1..=12))
}

/// Name the partition an event should be written to.
///
/// Test traffic is never partitioned by date. Production traffic gets one
/// partition per calendar month of `today`.
pub fn resolve(kind: EventKind, is_test: bool, today: NaiveDate) -> PartitionId {
    if is_test {
        PartitionId(format!("{}-test", kind))
    } else {
        PartitionId(format!("{}-{:04}-{:02}", kind, today.year(), today.month()))
    }
}
