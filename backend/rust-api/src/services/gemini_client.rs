use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::GeminiConfig;
use crate::services::ai_error::AiError;

/// Candidate finish reasons that mean the output was withheld by a filter.
const SAFETY_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
];

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// First non-blank key among `GEMINI_API_KEY` and `API_KEY`.
pub fn env_api_key() -> Option<String> {
    API_KEY_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|key| !key.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

/// One schema-constrained generation request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub parts: Vec<ContentPart>,
    pub response_schema: Value,
}

/// Remote generative model callable with mixed text/image input that returns
/// JSON text conforming to the declared schema.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the raw response text; empty when the model produced nothing.
    async fn generate_json(&self, request: StructuredRequest) -> Result<String, AiError>;
}

pub struct GeminiClient {
    http_client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, AiError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Configured key, else the process environment as it is right now.
    fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(env_api_key)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_json(&self, request: StructuredRequest) -> Result<String, AiError> {
        let api_key = self.resolve_api_key().ok_or_else(|| {
            AiError::Configuration("GEMINI_API_KEY is not set".to_string())
        })?;

        let body = build_request_body(&request);
        tracing::debug!(
            model = %self.model,
            parts = request.parts.len(),
            "Sending generateContent request"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            tracing::warn!("Gemini returned error {}: {}", status, text);
            return Err(classify_http_error(status, &text));
        }

        let envelope: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            AiError::InvalidResponse(format!("Failed to parse Gemini response: {}", e))
        })?;

        extract_text(envelope)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn build_request_body(request: &StructuredRequest) -> GenerateContentRequest {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => RequestPart {
                text: Some(text.clone()),
                inline_data: None,
            },
            ContentPart::InlineImage { mime_type, data } => RequestPart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: mime_type.clone(),
                    data: general_purpose::STANDARD.encode(data),
                }),
            },
        })
        .collect();

    GenerateContentRequest {
        contents: vec![RequestContent {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: request.response_schema.clone(),
        },
    }
}

fn extract_text(envelope: GenerateContentResponse) -> Result<String, AiError> {
    if let Some(reason) = envelope
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(AiError::SafetyRejected(format!("prompt blocked: {}", reason)));
    }

    let Some(candidate) = envelope.candidates.into_iter().next() else {
        return Ok(String::new());
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(AiError::SafetyRejected(format!(
                "candidate finished with {}",
                reason
            )));
        }
    }

    Ok(candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

fn map_transport_error(err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Network(format!("request to model service timed out: {}", err))
    } else if err.is_connect() {
        AiError::Network(format!("could not connect to model service: {}", err))
    } else {
        AiError::Network(err.to_string())
    }
}

fn classify_http_error(status: StatusCode, body: &str) -> AiError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.to_string(), String::new()),
    };
    let lowered = message.to_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS || api_status == "RESOURCE_EXHAUSTED" {
        return AiError::Quota(message);
    }
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lowered.contains("api key")
    {
        return AiError::Configuration(format!("credential rejected: {}", message));
    }
    if status == StatusCode::BAD_REQUEST {
        if lowered.contains("safety") {
            return AiError::SafetyRejected(message);
        }
        if ["image", "inline_data", "inlinedata", "mime"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            return AiError::MalformedInput(message);
        }
    }

    AiError::Upstream {
        status: status.as_u16(),
        message,
    }
}
