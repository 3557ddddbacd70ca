use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::metrics;
use crate::models::{AnalysisResult, Difficulty, ImagePayload, WrongQuestion};
use crate::services::ai_error::{AiError, AiOperation};
use crate::services::gemini_client::{ContentPart, GenerativeModel, StructuredRequest};

const ANALYSIS_INSTRUCTION: &str = "你是一位资深小学数学老师。请分析这些已批改的数学卷子（可能有多张）。\
识别出所有被打叉（红色错误标记）的题目。提取这些题目的文本，分析它们背后的知识点，并给出简洁的错误原因分析。\
最后汇总并总结学生的整体薄弱点。";

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Raw photo of a graded exam page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ExamImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Builds an image, picking PNG when the bytes carry its signature and JPEG otherwise.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = if data.starts_with(&PNG_SIGNATURE) {
            "image/png"
        } else {
            DEFAULT_IMAGE_MIME
        };
        Self::new(mime_type, data)
    }

    /// Decodes an uploaded base64 payload. Data URLs (`data:image/png;base64,...`) are accepted.
    pub fn from_payload(payload: &ImagePayload) -> Result<Self, AiError> {
        let (data_url_mime, encoded) = match payload.data.split_once(";base64,") {
            Some((prefix, rest)) => (prefix.strip_prefix("data:").map(str::to_string), rest),
            None => (None, payload.data.as_str()),
        };

        let data = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AiError::MalformedInput(format!("image is not valid base64: {}", e)))?;
        if data.is_empty() {
            return Err(AiError::MalformedInput("image payload is empty".to_string()));
        }

        match payload.mime_type.clone().or(data_url_mime) {
            Some(mime_type) => Ok(Self::new(mime_type, data)),
            None => Ok(Self::from_bytes(data)),
        }
    }
}

pub struct ExamAnalysisService {
    model: Arc<dyn GenerativeModel>,
}

impl ExamAnalysisService {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, images: &[ExamImage]) -> Result<AnalysisResult, AiError> {
        if images.is_empty() {
            return Err(AiError::MalformedInput(
                "at least one exam image is required".to_string(),
            ));
        }

        tracing::info!(
            "Analyzing {} exam image(s) with model={}",
            images.len(),
            self.model.model_name()
        );

        let mut parts: Vec<ContentPart> = images
            .iter()
            .map(|image| ContentPart::InlineImage {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            })
            .collect();
        parts.push(ContentPart::Text(ANALYSIS_INSTRUCTION.to_string()));

        let request = StructuredRequest {
            parts,
            response_schema: analysis_schema(),
        };

        let raw = metrics::track_ai_call(
            AiOperation::Analysis.as_str(),
            self.model.generate_json(request),
        )
        .await?;

        let result = decode_analysis(&raw)?;
        tracing::info!(
            "Analysis finished: wrong_questions={}, weak_points={}",
            result.wrong_questions.len(),
            result.weak_points.len()
        );
        Ok(result)
    }
}

/// Response schema declared to the model.
pub fn analysis_schema() -> Value {
    let levels: Vec<&str> = Difficulty::ALL.iter().map(|d| d.label()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "wrongQuestions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "originalText": { "type": "STRING", "description": "题目的原始文本" },
                        "knowledgePoint": {
                            "type": "STRING",
                            "description": "涉及的具体数学知识点，如：分数乘法、长方形面积、简便运算等"
                        },
                        "difficulty": { "type": "STRING", "enum": levels },
                        "analysis": {
                            "type": "STRING",
                            "description": "为什么做错，或者是这道题考察的关键逻辑"
                        }
                    },
                    "required": ["id", "originalText", "knowledgePoint", "difficulty", "analysis"]
                }
            },
            "overallSummary": { "type": "STRING", "description": "对这份卷子表现的整体评价" },
            "weakPoints": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "提取出的 3-5 个核心薄弱知识点"
            }
        },
        "required": ["wrongQuestions", "overallSummary", "weakPoints"]
    })
}

/// Validates the model payload against the declared shape.
///
/// Empty text means "nothing detected". Entries missing a required field or
/// carrying an unknown difficulty are dropped; a missing id is replaced by the
/// entry's position.
pub fn decode_analysis(raw: &str) -> Result<AnalysisResult, AiError> {
    if raw.trim().is_empty() {
        return Ok(AnalysisResult::default());
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AiError::InvalidResponse(format!("analysis is not JSON: {}", e)))?;
    let Value::Object(root) = value else {
        return Err(AiError::InvalidResponse(
            "analysis payload is not an object".to_string(),
        ));
    };

    let wrong_questions = root
        .get("wrongQuestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| decode_wrong_question(index, item))
                .collect()
        })
        .unwrap_or_default();

    Ok(AnalysisResult {
        wrong_questions,
        overall_summary: string_field(&root, "overallSummary").unwrap_or_default(),
        weak_points: string_list(root.get("weakPoints")),
    })
}

fn decode_wrong_question(index: usize, item: &Value) -> Option<WrongQuestion> {
    let Some(fields) = item.as_object() else {
        tracing::warn!("Dropping wrong question #{}: not an object", index + 1);
        return None;
    };

    let difficulty = string_field(fields, "difficulty").and_then(|d| Difficulty::parse(&d));
    let question = (|| {
        Some(WrongQuestion {
            id: string_field(fields, "id").unwrap_or_else(|| (index + 1).to_string()),
            original_text: string_field(fields, "originalText")?,
            knowledge_point: string_field(fields, "knowledgePoint")?,
            difficulty: difficulty?,
            analysis: string_field(fields, "analysis")?,
        })
    })();

    if question.is_none() {
        tracing::warn!(
            "Dropping wrong question #{}: missing field or unknown difficulty",
            index + 1
        );
    }
    question
}

pub(crate) fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
