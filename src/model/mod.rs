// Baseline forecaster
//
// A per-tag mean model. It exists so the service has something to train and
// query; every call into it is recorded by the event log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const MODEL_VERSION: &str = "0.1";
pub const MODEL_VERSION_NOTE: &str = "per-tag mean baseline";

/// Tag that aggregates every segment
pub const ALL_TAG: &str = "all";

/// Series used when a train request carries no data
pub fn sample_data() -> BTreeMap<String, Vec<f64>> {
    let mut data = BTreeMap::new();
    data.insert(
        ALL_TAG.to_string(),
        vec![112.0, 118.0, 132.0, 129.0, 121.0, 135.0, 148.0, 148.0, 136.0, 119.0],
    );
    data.insert(
        "united_kingdom".to_string(),
        vec![84.0, 90.0, 97.0, 95.0, 88.0, 101.0, 110.0, 109.0],
    );
    data
}

/// Result of fitting one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutcome {
    pub tag: String,
    pub observations: usize,
    pub rmse: f64,
}

impl TrainOutcome {
    /// Training window as logged, `(first_index,observations)`
    pub fn period(&self) -> String {
        format!("(0,{})", self.observations)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BaselineModel {
    means: BTreeMap<String, f64>,
}

impl BaselineModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit one mean per tag; empty series are ignored.
    pub fn train(&mut self, data: &BTreeMap<String, Vec<f64>>) -> Vec<TrainOutcome> {
        let mut outcomes = Vec::with_capacity(data.len());

        for (tag, series) in data {
            if series.is_empty() {
                continue;
            }
            let n = series.len() as f64;
            let mean = series.iter().sum::<f64>() / n;
            let mse = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

            self.means.insert(tag.clone(), mean);
            outcomes.push(TrainOutcome {
                tag: tag.clone(),
                observations: series.len(),
                rmse: mse.sqrt(),
            });
        }

        outcomes
    }

    /// Point prediction for `tag`, `None` until the tag has been trained
    pub fn predict(&self, tag: &str) -> Option<f64> {
        self.means.get(tag).copied()
    }

    pub fn is_trained(&self) -> bool {
        !self.means.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.means.keys().map(String::as_str)
    }
}

/// Render an elapsed duration as `HH:MM:SS`
pub fn format_runtime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
