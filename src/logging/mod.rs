// Event logging
//
// Every train and predict invocation is recorded to CSV files under the log
// directory, one file per event kind and calendar month (or one fixed file
// for test traffic).

pub mod clock;
pub mod error;
pub mod partition;
pub mod reader;
pub mod records;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LogResult, LogStoreError};
pub use partition::{resolve, EventKind, PartitionId};
pub use reader::{list_partitions, read_partition, summarize, LogScan, LogSummary};
pub use records::{LogRecord, PredictEvent, PredictPayload, TrainEvent, TrainPayload};
pub use store::{ensure_storage_ready, EventLogStore, StoreConfig, DEFAULT_LOCK_TIMEOUT};
