use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::{
    extractors::AppJson,
    models::{AnalysisResult, AnalyzeExamRequest},
    services::{
        ai_error::{AiError, AiOperation},
        exam_analysis::ExamImage,
        AppState,
    },
};

pub async fn analyze_exam(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<AnalyzeExamRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let images = req
        .images
        .iter()
        .map(ExamImage::from_payload)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            tracing::warn!("Rejected exam upload: {}", e);
            ApiError::ai(e, AiOperation::Analysis)
        })?;

    tracing::info!("Received {} exam image(s) for analysis", images.len());

    let result = state.analysis.analyze(&images).await.map_err(|e| {
        tracing::error!("Exam analysis failed: {}", e);
        ApiError::ai(e, AiOperation::Analysis)
    })?;

    if !result.has_wrong_questions() {
        tracing::warn!("Exam analysis found no marked wrong questions");
        return Err(ApiError::ai(
            AiError::EmptyResult("no wrong questions detected".to_string()),
            AiOperation::Analysis,
        ));
    }

    Ok(Json(result))
}
