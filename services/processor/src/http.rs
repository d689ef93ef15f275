//! Operational HTTP surface: health, Prometheus metrics and a read-only view
//! of persisted transactions.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use shared::errors::ServiceError;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::domain::Transaction;
use crate::errors::RepositoryError;
use crate::repository::TransactionRepository;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TransactionRepository>,
    /// `None` when no Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(repository: Arc<dyn TransactionRepository>, metrics: Option<PrometheusHandle>) -> Self {
        Self { repository, metrics }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/transactions", get(list_transactions))
        .with_state(state)
}

/// Bind `port` on all interfaces and serve until the task is aborted
pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Processor HTTP listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

async fn list_transactions(State(state): State<AppState>) -> Result<Json<Vec<Transaction>>, ApiError> {
    let transactions = state.repository.get_all_transactions().await?;
    Ok(Json(transactions))
}

/// Wraps a [`ServiceError`] so handlers can return it with `?`
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(e) => ApiError(ServiceError::database_error(e)),
            other => ApiError(ServiceError::internal(other.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status = StatusCode::from_u16(error.category.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match error.category.log_level() {
            "error" => tracing::error!(code = %error.code, error = %error, "Request failed"),
            _ => tracing::warn!(code = %error.code, error = %error, "Request rejected"),
        }

        (status, Json(error)).into_response()
    }
}
