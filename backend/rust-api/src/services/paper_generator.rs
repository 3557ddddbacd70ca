use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics;
use crate::models::{GeneratedPaper, GeneratedQuestion, PaperConfig};
use crate::services::ai_error::{AiError, AiOperation};
use crate::services::exam_analysis::{string_field, string_list};
use crate::services::gemini_client::{ContentPart, GenerativeModel, StructuredRequest};

const WEAK_POINT_SEPARATOR: &str = "、";

pub struct PaperGeneratorService {
    model: Arc<dyn GenerativeModel>,
}

impl PaperGeneratorService {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        weak_points: &[String],
        config: PaperConfig,
    ) -> Result<GeneratedPaper, AiError> {
        let weak_points: Vec<&str> = weak_points
            .iter()
            .map(|point| point.trim())
            .filter(|point| !point.is_empty())
            .collect();
        if weak_points.is_empty() {
            return Err(AiError::MalformedInput(
                "at least one weak point is required".to_string(),
            ));
        }

        tracing::info!(
            "Generating practice paper: weak_points={}, count={}, difficulty={}",
            weak_points.len(),
            config.count,
            config.difficulty.as_str()
        );

        let request = StructuredRequest {
            parts: vec![ContentPart::Text(build_prompt(&weak_points, config))],
            response_schema: paper_schema(),
        };

        let raw = metrics::track_ai_call(
            AiOperation::Generation.as_str(),
            self.model.generate_json(request),
        )
        .await?;

        let paper = decode_paper(&raw)?;
        if paper.questions.len() != config.count as usize {
            tracing::debug!(
                "Model returned {} question(s), {} requested",
                paper.questions.len(),
                config.count
            );
        }
        Ok(paper)
    }
}

pub fn build_prompt(weak_points: &[&str], config: PaperConfig) -> String {
    format!(
        "基于以下薄弱知识点：{}，为一名小学生生成一份强化练习卷。\n\
         练习卷应包含 {} 道题目，涵盖这些知识点。题目整体难度设定为：{}。题目要具有针对性。",
        weak_points.join(WEAK_POINT_SEPARATOR),
        config.count,
        config.difficulty.label()
    )
}

/// Response schema declared to the model.
pub fn paper_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "questions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "question": { "type": "STRING" },
                        "options": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "如果是选择题请提供选项，否则可不提供"
                        },
                        "answer": { "type": "STRING" },
                        "explanation": { "type": "STRING" },
                        "knowledgePoint": { "type": "STRING" }
                    },
                    "required": ["id", "question", "answer", "explanation", "knowledgePoint"]
                }
            }
        },
        "required": ["title", "questions"]
    })
}

/// Validates the generated paper. Questions missing a required field are
/// dropped; a missing id gets a fresh one so bank deletion stays addressable.
pub fn decode_paper(raw: &str) -> Result<GeneratedPaper, AiError> {
    if raw.trim().is_empty() {
        return Ok(GeneratedPaper::default());
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AiError::InvalidResponse(format!("paper is not JSON: {}", e)))?;
    let Value::Object(root) = value else {
        return Err(AiError::InvalidResponse(
            "paper payload is not an object".to_string(),
        ));
    };

    let questions = root
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let question = decode_question(item);
                    if question.is_none() {
                        tracing::warn!("Dropping generated question #{}: incomplete", index + 1);
                    }
                    question
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(GeneratedPaper {
        title: string_field(&root, "title").unwrap_or_default(),
        questions,
    })
}

fn decode_question(item: &Value) -> Option<GeneratedQuestion> {
    let fields = item.as_object()?;
    let options = string_list(fields.get("options"));

    Some(GeneratedQuestion {
        id: string_field(fields, "id").unwrap_or_else(|| Uuid::new_v4().to_string()),
        question: string_field(fields, "question")?,
        options: (!options.is_empty()).then_some(options),
        answer: string_field(fields, "answer")?,
        explanation: string_field(fields, "explanation")?,
        knowledge_point: string_field(fields, "knowledgePoint")?,
        timestamp: None,
    })
}
