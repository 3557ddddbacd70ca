use thiserror::Error;

/// Which model-backed operation a failure came from; selects the fallback copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiOperation {
    Analysis,
    Generation,
}

impl AiOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiOperation::Analysis => "analysis",
            AiOperation::Generation => "generation",
        }
    }
}

/// Closed set of failures raised by the model-backed clients.
///
/// Transport and HTTP level signals are translated into these kinds at the
/// client boundary, so callers never inspect message text.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("content rejected by safety filter: {0}")]
    SafetyRejected(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("model service returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    pub fn kind(&self) -> &'static str {
        match self {
            AiError::Configuration(_) => "configuration",
            AiError::SafetyRejected(_) => "safety_rejected",
            AiError::MalformedInput(_) => "malformed_input",
            AiError::Quota(_) => "quota",
            AiError::Network(_) => "network",
            AiError::EmptyResult(_) => "empty_result",
            AiError::Upstream { .. } => "upstream",
            AiError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Transient failures the user may simply try again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::Quota(_) | AiError::Network(_))
    }

    /// Human readable message shown to the caregiver.
    pub fn user_message(&self, operation: AiOperation) -> &'static str {
        match self {
            AiError::Configuration(_) => "AI 服务尚未配置，请联系管理员设置 API 密钥。",
            AiError::SafetyRejected(_) => {
                "内容识别受限。请确保上传的试卷内容符合教学规范，且不包含敏感信息。"
            }
            AiError::MalformedInput(_) => "图片解析失败。请确保上传的是清晰的 JPG/PNG 格式照片。",
            AiError::Quota(_) => "请求过于频繁，请稍等片刻后再试。",
            AiError::Network(_) => "网络连接异常，请检查您的网络设置后重试。",
            AiError::EmptyResult(_) => match operation {
                AiOperation::Analysis => {
                    "未能在照片中识别到被打叉（红色标记）的错题。请确保照片清晰，且批改痕迹明显。"
                }
                AiOperation::Generation => "AI 老师没有生成任何题目，请调整设置后重试。",
            },
            AiError::Upstream { .. } | AiError::InvalidResponse(_) => match operation {
                AiOperation::Analysis => {
                    "分析卷子失败。建议上传光线更充足、字迹更清晰的试卷照片。"
                }
                AiOperation::Generation => "生成练习卷失败。AI 老师可能需要休息一下，请稍后重试。",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_failures_use_operation_fallback() {
        let err = AiError::Upstream {
            status: 500,
            message: "internal".into(),
        };
        assert!(err.user_message(AiOperation::Analysis).starts_with("分析卷子失败"));
        assert!(err
            .user_message(AiOperation::Generation)
            .starts_with("生成练习卷失败"));
    }

    #[test]
    fn specific_kinds_share_copy_across_operations() {
        let err = AiError::Quota("RESOURCE_EXHAUSTED".into());
        assert_eq!(
            err.user_message(AiOperation::Analysis),
            err.user_message(AiOperation::Generation)
        );
        assert!(err.is_transient());
        assert!(!AiError::SafetyRejected("SAFETY".into()).is_transient());
    }

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(AiError::EmptyResult("none".into()).kind(), "empty_result");
        assert_eq!(AiError::Configuration("key".into()).kind(), "configuration");
    }
}
