// Log record schemas
//
// Field order in these structs is the column order on disk. The csv encoder
// serializes fields in declaration order, so reordering a field here changes
// the file format.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::partition::EventKind;

/// A row type that can be appended to a partition file
pub trait LogRecord: Serialize + DeserializeOwned + Send + 'static {
    const KIND: EventKind;

    /// Column names, in on-disk order
    const HEADER: &'static [&'static str];

    fn unique_id(&self) -> &str;

    /// Epoch seconds at which the record was written
    fn timestamp(&self) -> f64;

    /// Segment the record belongs to (tag for train, country for predict)
    fn segment(&self) -> &str;

    fn model_version(&self) -> &str;
}

/// Epoch seconds with microsecond precision
pub fn epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_micros() as f64 / 1_000_000.0
}

/// Fresh high-entropy record identifier
pub fn new_unique_id() -> String {
    Uuid::new_v4().to_string()
}

/// Caller-supplied fields of a train event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainPayload {
    /// Segment label (e.g. a country)
    pub tag: String,
    /// Description of the training window
    pub period: String,
    /// Reported training error
    pub rmse: String,
    /// Duration as HH:MM:SS
    pub runtime: String,
    pub model_version: String,
    pub model_version_note: String,
}

/// One line of a train partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainEvent {
    pub unique_id: String,
    pub timestamp: f64,
    pub tag: String,
    pub period: String,
    pub rmse: String,
    pub model_version: String,
    pub model_version_note: String,
    pub runtime: String,
}

impl TrainEvent {
    pub fn from_payload(payload: &TrainPayload, unique_id: String, now: DateTime<Utc>) -> Self {
        Self {
            unique_id,
            timestamp: epoch_seconds(now),
            tag: payload.tag.clone(),
            period: payload.period.clone(),
            rmse: payload.rmse.clone(),
            model_version: payload.model_version.clone(),
            model_version_note: payload.model_version_note.clone(),
            runtime: payload.runtime.clone(),
        }
    }
}

impl LogRecord for TrainEvent {
    const KIND: EventKind = EventKind::Train;
    const HEADER: &'static [&'static str] = &[
        "unique_id",
        "timestamp",
        "tag",
        "period",
        "rmse",
        "model_version",
        "model_version_note",
        "runtime",
    ];

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn segment(&self) -> &str {
        &self.tag
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Caller-supplied fields of a predict event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictPayload {
    /// Segment key the prediction was made for
    pub country: String,
    /// Point prediction, already rendered as text
    pub y_pred: String,
    /// Predicted probability, when the model produces one
    pub y_proba: Option<String>,
    pub target_date: String,
    pub runtime: String,
    pub model_version: String,
}

/// One line of a predict partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictEvent {
    pub unique_id: String,
    pub timestamp: f64,
    pub country: String,
    pub y_pred: String,
    /// Empty column on disk when absent
    pub y_proba: Option<String>,
    pub target_date: String,
    pub model_version: String,
    pub runtime: String,
}

impl PredictEvent {
    pub fn from_payload(payload: &PredictPayload, unique_id: String, now: DateTime<Utc>) -> Self {
        Self {
            unique_id,
            timestamp: epoch_seconds(now),
            country: payload.country.clone(),
            y_pred: payload.y_pred.clone(),
            y_proba: payload.y_proba.clone(),
            target_date: payload.target_date.clone(),
            model_version: payload.model_version.clone(),
            runtime: payload.runtime.clone(),
        }
    }
}

impl LogRecord for PredictEvent {
    const KIND: EventKind = EventKind::Predict;
    const HEADER: &'static [&'static str] = &[
        "unique_id",
        "timestamp",
        "country",
        "y_pred",
        "y_proba",
        "target_date",
        "model_version",
        "runtime",
    ];

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn segment(&self) -> &str {
        &self.country
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Header the csv encoder derives from the struct, as written to disk
    fn derived_header<R: LogRecord>(record: &R) -> Vec<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(record).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let first = text.lines().next().unwrap().to_string();
        first.split(',').map(str::to_string).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_train_header_matches_struct_order() {
        let payload = TrainPayload {
            tag: "all".into(),
            period: "(0,10)".into(),
            rmse: "0.5".into(),
            runtime: "00:00:01".into(),
            model_version: "0.1".into(),
            model_version_note: "note".into(),
        };
        let event = TrainEvent::from_payload(&payload, new_unique_id(), now());
        assert_eq!(derived_header(&event), TrainEvent::HEADER);
    }

    #[test]
    fn test_predict_header_matches_struct_order() {
        let payload = PredictPayload {
            country: "all".into(),
            y_pred: "[0.6]".into(),
            y_proba: None,
            target_date: "2018-02-12".into(),
            runtime: "00:00:01".into(),
            model_version: "0.1".into(),
        };
        let event = PredictEvent::from_payload(&payload, new_unique_id(), now());
        assert_eq!(derived_header(&event), PredictEvent::HEADER);
    }

    #[test]
    fn test_epoch_seconds_keeps_sub_second_precision() {
        let t = Utc.timestamp_micros(1_710_504_000_250_000).unwrap();
        assert_eq!(epoch_seconds(t), 1_710_504_000.25);
    }

    #[test]
    fn test_unique_ids_differ() {
        assert_ne!(new_unique_id(), new_unique_id());
        assert_eq!(new_unique_id().len(), 36);
    }
}
