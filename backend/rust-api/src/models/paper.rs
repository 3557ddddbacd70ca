use serde::{Deserialize, Serialize};
use validator::Validate;

use super::analysis::Difficulty;

pub const MIN_QUESTION_COUNT: u32 = 5;
pub const MAX_QUESTION_COUNT: u32 = 15;
pub const DEFAULT_QUESTION_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperConfig {
    pub count: u32,
    pub difficulty: Difficulty,
}

impl PaperConfig {
    pub fn new(count: u32, difficulty: Difficulty) -> Self {
        Self { count, difficulty }
    }

    /// Clamp `count` into the supported range.
    pub fn clamped(self) -> Self {
        Self {
            count: self.count.clamp(MIN_QUESTION_COUNT, MAX_QUESTION_COUNT),
            ..self
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_QUESTION_COUNT,
            difficulty: Difficulty::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub answer: String,
    pub explanation: String,
    pub knowledge_point: String,
    /// Epoch milliseconds, set when the question is saved into the bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl GeneratedQuestion {
    pub fn matches(&self, filter: &str) -> bool {
        filter.is_empty() || self.question.contains(filter) || self.knowledge_point.contains(filter)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedPaper {
    pub title: String,
    pub questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePaperRequest {
    #[validate(length(min = 1, message = "At least one weak point is required"))]
    pub weak_points: Vec<String>,
    pub count: Option<u32>,
    pub difficulty: Option<Difficulty>,
}

impl GeneratePaperRequest {
    pub fn config(&self) -> PaperConfig {
        PaperConfig {
            count: self.count.unwrap_or(DEFAULT_QUESTION_COUNT),
            difficulty: self.difficulty.unwrap_or_default(),
        }
        .clamped()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BankQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteQuestionResponse {
    pub id: String,
    pub removed: bool,
}
