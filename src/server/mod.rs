// Model service
// HTTP surface exposing train/predict actions and read-back of the event logs

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{
    handle_logs, handle_predict, handle_train, health_check, PredictRequest, PredictResponse,
    TrainRequest, TEST_MODE,
};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::constants::MAX_BODY_BYTES;
use crate::config::Config;
use crate::logging::EventLogStore;
use crate::model::BaselineModel;

/// Shared state behind every handler
pub struct AppState {
    pub config: Config,
    pub store: Arc<EventLogStore>,
    /// Model fitted by production traffic
    pub model: RwLock<BaselineModel>,
    /// Model fitted by `mode: "test"` traffic, never visible to production
    pub test_model: RwLock<BaselineModel>,
}

impl AppState {
    pub fn new(config: Config, store: EventLogStore) -> Self {
        Self {
            config,
            store: Arc::new(store),
            model: RwLock::new(BaselineModel::new()),
            test_model: RwLock::new(BaselineModel::new()),
        }
    }

    pub fn model_for(&self, is_test: bool) -> &RwLock<BaselineModel> {
        if is_test {
            &self.test_model
        } else {
            &self.model
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/train", post(handle_train))
        .route("/predict", post(handle_predict))
        .route("/logs/:kind", get(handle_logs))
        .with_state(state)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = state
        .config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", state.config.bind_address))?;

    let app = create_router(state);

    tracing::info!("Starting model service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
