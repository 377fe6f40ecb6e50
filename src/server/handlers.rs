// Route handlers for the model service

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::error::ApiError;
use super::AppState;
use crate::logging::{
    read_partition, resolve, EventKind, PartitionId, PredictEvent, PredictPayload, TrainEvent,
    TrainPayload,
};
use crate::model::{format_runtime, sample_data, ALL_TAG};

/// Request mode that routes logging to the fixed test partitions
pub const TEST_MODE: &str = "test";

#[derive(Debug, Default, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub mode: Option<String>,
    /// Series per tag; the built-in sample is used when absent
    #[serde(default)]
    pub data: Option<BTreeMap<String, Vec<f64>>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub target_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub y_pred: f64,
    pub y_proba: Option<f64>,
    pub unique_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub partition: Option<String>,
}

fn is_test(mode: &Option<String>) -> bool {
    mode.as_deref() == Some(TEST_MODE)
}

/// POST /train — fit the model and log one train event per tag
pub async fn handle_train(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<bool>, ApiError> {
    let test = is_test(&request.mode);
    let data = request.data.unwrap_or_else(sample_data);

    let started = Instant::now();
    let outcomes = state.model_for(test).write().await.train(&data);
    let runtime = format_runtime(started.elapsed());

    if outcomes.is_empty() {
        return Err(ApiError::BadRequest(
            "no non-empty series to train on".to_string(),
        ));
    }

    let payloads: Vec<TrainPayload> = outcomes
        .iter()
        .map(|outcome| TrainPayload {
            tag: outcome.tag.clone(),
            period: outcome.period(),
            rmse: format!("{:.4}", outcome.rmse),
            runtime: runtime.clone(),
            model_version: state.config.model_version.clone(),
            model_version_note: state.config.model_version_note.clone(),
        })
        .collect();

    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || {
        payloads
            .iter()
            .try_for_each(|payload| store.record_train(payload, test).map(|_| ()))
    })
    .await??;

    tracing::info!(tags = outcomes.len(), test, "Training complete");
    Ok(Json(true))
}

/// POST /predict — predict for one segment and log the predict event
pub async fn handle_predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let test = is_test(&request.mode);
    let country = request.country.unwrap_or_else(|| ALL_TAG.to_string());

    let started = Instant::now();
    let y_pred = state
        .model_for(test)
        .read()
        .await
        .predict(&country)
        .ok_or_else(|| ApiError::NotFound(format!("no trained model for '{country}'")))?;
    let runtime = format_runtime(started.elapsed());

    let target_date = request
        .target_date
        .unwrap_or_else(|| state.store.now().format("%Y-%m-%d").to_string());

    let payload = PredictPayload {
        country,
        y_pred: y_pred.to_string(),
        y_proba: None,
        target_date,
        runtime,
        model_version: state.config.model_version.clone(),
    };

    let store = Arc::clone(&state.store);
    let event = tokio::task::spawn_blocking(move || store.record_predict(&payload, test)).await??;

    Ok(Json(PredictResponse {
        y_pred,
        y_proba: None,
        unique_id: event.unique_id,
    }))
}

/// GET /logs/:kind — read one partition back (current month by default)
pub async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    let kind: EventKind = kind.parse().map_err(ApiError::NotFound)?;

    let partition = match query.partition {
        Some(p) => {
            let partition: PartitionId = p.parse().map_err(ApiError::BadRequest)?;
            if partition.kind() != Some(kind) {
                return Err(ApiError::BadRequest(format!(
                    "partition {partition} does not hold {kind} events"
                )));
            }
            partition
        }
        None => resolve(kind, false, state.store.now().date_naive()),
    };

    let log_dir = state.store.log_dir().to_path_buf();
    let body = tokio::task::spawn_blocking(move || -> Result<Value, ApiError> {
        let value = match kind {
            EventKind::Train => json!(read_partition::<TrainEvent>(&log_dir, &partition)?),
            EventKind::Predict => json!(read_partition::<PredictEvent>(&log_dir, &partition)?),
        };
        Ok(value)
    })
    .await??;

    Ok(Json(body))
}

/// GET /health — reports the production model only
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let model = state.model.read().await;
    Json(json!({
        "status": "ok",
        "model_version": state.config.model_version,
        "model_trained": model.is_trained(),
        "trained_tags": model.tags().collect::<Vec<_>>(),
    }))
}
