use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{
    models::{BankQuery, DeleteQuestionResponse, GeneratedQuestion},
    services::AppState,
};

pub async fn list_bank(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BankQuery>,
) -> Result<Json<Vec<GeneratedQuestion>>, ApiError> {
    let questions = match query.q.as_deref() {
        Some(filter) => state.bank.search(filter).await?,
        None => state.bank.list().await?,
    };
    tracing::debug!("Listing {} bank question(s)", questions.len());
    Ok(Json(questions))
}

pub async fn clear_bank(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.bank.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteQuestionResponse>, ApiError> {
    let removed = state.bank.delete_one(&id).await?;
    Ok(Json(DeleteQuestionResponse { id, removed }))
}
