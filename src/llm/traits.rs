//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / 脚本化 Mock）实现 LlmClient::complete；限流必须以 LlmError::RateLimited 单独报告，
//! 控制循环据此冷却重试，其它错误一律终止任务。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 推理服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("api error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 从后端错误文本归类：429 / rate limit 视为限流
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("too many requests")
        {
            LlmError::RateLimited { retry_after_ms: 0 }
        } else if lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("dns")
        {
            LlmError::Network(message)
        } else {
            LlmError::Api(message)
        }
    }
}

/// LLM 客户端 trait：按角色标注的对话输入，返回文本（可能内嵌工具调用块）
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let e = LlmError::classify("HTTP 429 Too Many Requests");
        assert!(matches!(e, LlmError::RateLimited { .. }));
        let e = LlmError::classify("Rate limit reached for model llama-3.3-70b-versatile");
        assert!(matches!(e, LlmError::RateLimited { .. }));
    }

    #[test]
    fn test_classify_other() {
        assert!(matches!(
            LlmError::classify("error trying to connect: connection refused"),
            LlmError::Network(_)
        ));
        assert!(matches!(LlmError::classify("Invalid API Key"), LlmError::Api(_)));
    }
}
