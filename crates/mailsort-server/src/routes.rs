//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mailsort_core::{Distribution, Error, PredictionResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::state::AppState;

/// Worst-case JSON expansion of one email byte (`\u00XX`)
const JSON_ESCAPE_FACTOR: usize = 6;

/// Room for the `{"email": ...}` envelope
const BODY_ENVELOPE_SLACK: usize = 64;

/// Raw body cap that still admits any email within `max_email_bytes`
fn body_limit(max_email_bytes: usize) -> usize {
    max_email_bytes
        .saturating_mul(JSON_ESCAPE_FACTOR)
        .saturating_add(BODY_ENVELOPE_SLACK)
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = body_limit(state.config.max_email_bytes);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub category: String,
    pub probabilities: Distribution,
}

impl From<PredictionResult> for PredictResponse {
    fn from(prediction: PredictionResult) -> Self {
        Self {
            category: prediction.label,
            probabilities: prediction.distribution,
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    metrics::counter!("mailsort_requests_total").increment(1);

    let Json(request) = payload?;
    check_email(&request.email, &state.config)?;

    let classification = state
        .classifier
        .classify(&request.email, state.config.confidence_threshold)
        .await?;

    metrics::histogram!("mailsort_inference_latency_us").record(classification.latency_us as f64);
    metrics::counter!(
        "mailsort_predictions_total",
        "category" => classification.prediction.label.clone()
    )
    .increment(1);

    debug!(
        category = %classification.prediction.label,
        top_probability = classification.prediction.top_probability(),
        model = %classification.model,
        latency_us = classification.latency_us,
        "prediction served"
    );

    Ok(Json(classification.prediction.into()))
}

/// Size and length checks, run before the classifier is touched
fn check_email(email: &str, config: &ServerConfig) -> Result<(), AppError> {
    if email.len() > config.max_email_bytes {
        return Err(AppError::PayloadTooLarge {
            limit: config.max_email_bytes,
        });
    }

    let chars = email.chars().count();
    if chars < config.min_email_chars {
        return Err(Error::validation(format!(
            "email must be at least {} characters, got {}",
            config.min_email_chars, chars
        ))
        .into());
    }

    Ok(())
}

async fn fallback() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "message": "not found", "type": "not_found" } })),
    )
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(#[from] JsonRejection),

    #[error("email exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    Core(#[from] Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::Core(err) => err.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        metrics::counter!("mailsort_errors_total", "kind" => kind).increment(1);

        let (status, message) = match &self {
            AppError::InvalidRequest(rejection) => {
                debug!(error = %rejection, "rejected request body");
                (rejection.status(), rejection.body_text())
            }
            AppError::PayloadTooLarge { .. } => {
                warn!(error = %self, "rejected oversized email");
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            AppError::Core(err) if err.is_client_error() => {
                debug!(error = %err, "rejected email");
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            AppError::Core(err) => {
                error!(error = %err, kind, "classification failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error while classifying email".to_string(),
                )
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
