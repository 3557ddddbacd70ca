use serde::{Deserialize, Serialize};
use validator::Validate;

/// Difficulty level shared by diagnosed questions and paper configuration.
///
/// Serialized as `easy` / `medium` / `hard`; the Chinese labels the model is
/// prompted with are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "easy", alias = "简单")]
    Easy,
    #[default]
    #[serde(rename = "medium", alias = "中等")]
    Medium,
    #[serde(rename = "hard", alias = "困难")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Label used in prompts and in the response schema enum.
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "简单",
            Difficulty::Medium => "中等",
            Difficulty::Hard => "困难",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|level| {
            level.as_str().eq_ignore_ascii_case(value) || level.label() == value
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongQuestion {
    pub id: String,
    pub original_text: String,
    pub knowledge_point: String,
    pub difficulty: Difficulty,
    pub analysis: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub wrong_questions: Vec<WrongQuestion>,
    pub overall_summary: String,
    pub weak_points: Vec<String>,
}

impl AnalysisResult {
    /// An analysis without flagged questions is a soft failure for callers.
    pub fn has_wrong_questions(&self) -> bool {
        !self.wrong_questions.is_empty()
    }
}

/// Single uploaded exam photo, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnalyzeExamRequest {
    #[validate(length(min = 1, message = "At least one exam image is required"))]
    pub images: Vec<ImagePayload>,
}
