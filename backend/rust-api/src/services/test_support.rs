use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::services::ai_error::AiError;
use crate::services::gemini_client::{GenerativeModel, StructuredRequest};

/// Model double that replays one canned reply and records every request.
pub(crate) struct CannedModel {
    response: Result<String, fn() -> AiError>,
    pub(crate) requests: Mutex<Vec<StructuredRequest>>,
}

impl CannedModel {
    pub(crate) fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing(err: fn() -> AiError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(err),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerativeModel for CannedModel {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn generate_json(&self, request: StructuredRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request);
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(make) => Err(make()),
        }
    }
}
