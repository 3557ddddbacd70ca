use axum::{extract::State, http::header, response::IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::{
    extractors::AppJson,
    models::{GeneratePaperRequest, GeneratedPaper},
    services::{
        ai_error::{AiError, AiOperation},
        printable::render_printable,
        AppState,
    },
};

/// Generates a practice paper and saves its questions into the bank.
pub async fn generate_paper(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<GeneratePaperRequest>,
) -> Result<Json<GeneratedPaper>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let config = req.config();
    let paper = state
        .generator
        .generate(&req.weak_points, config)
        .await
        .map_err(|e| {
            tracing::error!("Practice paper generation failed: {}", e);
            ApiError::ai(e, AiOperation::Generation)
        })?;

    if paper.questions.is_empty() {
        tracing::warn!("Model returned a practice paper without questions");
        return Err(ApiError::ai(
            AiError::EmptyResult("no questions generated".to_string()),
            AiOperation::Generation,
        ));
    }

    // The paper is still returned when saving fails; the bank is a convenience copy.
    if let Err(e) = state.bank.save(&paper.questions).await {
        tracing::error!("Failed to save generated questions into bank: {}", e);
    }

    Ok(Json(paper))
}

pub async fn print_paper(AppJson(paper): AppJson<GeneratedPaper>) -> impl IntoResponse {
    tracing::info!(
        "Rendering printable paper with {} question(s)",
        paper.questions.len()
    );
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_printable(&paper),
    )
}
