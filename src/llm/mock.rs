//! 脚本化 LLM 客户端（用于测试与离线演练，无需 API）
//!
//! 按顺序弹出预置的回复或错误；脚本耗尽后返回 fallback。记录每次收到的对话，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 脚本化客户端
#[derive(Debug)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            fallback: "Nothing left to do.".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 只含成功回复的脚本
    pub fn from_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// 已被调用的次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 第 n 次调用收到的完整对话
    pub fn call(&self, n: usize) -> Option<Vec<Message>> {
        self.calls.lock().ok().and_then(|c| c.get(n).cloned())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_order_and_fallback() {
        let client = ScriptedLlmClient::new(vec![
            Err(LlmError::RateLimited { retry_after_ms: 0 }),
            Ok("first".to_string()),
        ])
        .with_fallback("done");
        let msgs = vec![Message::user("hi")];
        assert!(matches!(
            client.complete(&msgs).await,
            Err(LlmError::RateLimited { .. })
        ));
        assert_eq!(client.complete(&msgs).await.unwrap(), "first");
        assert_eq!(client.complete(&msgs).await.unwrap(), "done");
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.call(0).unwrap()[0].content, "hi");
    }
}
