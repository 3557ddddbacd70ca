use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::{
    ai_error::{AiError, AiOperation},
    gemini_client::env_api_key,
    question_bank::BankError,
    AppState,
};

pub mod analysis;
pub mod bank;
pub mod papers;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        state.bank.ping(),
    )
    .await
    {
        Ok(Ok(())) => json!({ "status": "healthy", "backend": state.bank.backend() }),
        Ok(Err(e)) => json!({
            "status": "unhealthy",
            "backend": state.bank.backend(),
            "error": e.to_string()
        }),
        Err(_) => json!({
            "status": "unhealthy",
            "backend": state.bank.backend(),
            "error": "Storage timeout after 1s"
        }),
    };
    let api_key_configured = state.config.gemini.api_key.is_some() || env_api_key().is_some();
    let model = json!({
        "model": state.config.gemini.model,
        "api_key_configured": api_key_configured
    });

    let healthy = storage["status"] == "healthy" && model["api_key_configured"] == true;
    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "zhixue-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": { "question_bank": storage, "gemini": model }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic Auth when METRICS_AUTH (username:password) is set
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Ok(expected) = std::env::var("METRICS_AUTH") else {
        return Ok(next.run(request).await);
    };

    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Ai(AiError, AiOperation),
    Internal(String),
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub(crate) fn ai(err: AiError, operation: AiOperation) -> Self {
        ApiError::Ai(err, operation)
    }
}

impl From<BankError> for ApiError {
    fn from(err: BankError) -> Self {
        tracing::error!("Question bank operation failed: {}", err);
        ApiError::Internal("题库读写失败，请稍后重试。".to_string())
    }
}

fn ai_status(err: &AiError) -> StatusCode {
    match err {
        AiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AiError::SafetyRejected(_) | AiError::EmptyResult(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AiError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        AiError::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
        AiError::Network(_) | AiError::Upstream { .. } | AiError::InvalidResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, retryable) = match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "bad_request", message, false)
            }
            ApiError::Ai(err, operation) => (
                ai_status(&err),
                err.kind(),
                err.user_message(operation).to_string(),
                err.is_transient(),
            ),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, true)
            }
        };
        (
            status,
            Json(json!({ "kind": kind, "message": message, "retryable": retryable })),
        )
            .into_response()
    }
}
