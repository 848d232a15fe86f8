//! 摘要服务
//!
//! 把一段动作记录压缩成一句事实陈述（保留文件名、错误码、应用名）。图谱合并与短期缓冲剪枝共用。
//! 质量不做校验，只要求非空。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 摘要服务 trait
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, items: &[String]) -> Result<String, AgentError>;
}

const SUMMARY_PROMPT: &str = "You are a backend process for an AI agent.
Compress the following list of GUI actions into a single factual sentence.
Keep filenames, error codes, and app names.

ACTIONS:
{actions}

SUMMARY:";

/// 基于 LLM 的摘要（默认指向本地 Llama 3.2）
pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(items: &[String]) -> String {
        let actions = items
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        SUMMARY_PROMPT.replace("{actions}", &actions)
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, items: &[String]) -> Result<String, AgentError> {
        if items.is_empty() {
            return Err(AgentError::SummarizationFailed("nothing to summarize".to_string()));
        }
        let prompt = Self::build_prompt(items);
        let reply = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(|e| AgentError::SummarizationFailed(e.to_string()))?;
        let summary = reply.trim().to_string();
        if summary.is_empty() {
            return Err(AgentError::SummarizationFailed("empty summary".to_string()));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_summarize_trims_reply() {
        let llm = Arc::new(ScriptedLlmClient::from_replies(["  Opened notepad.exe and typed notes.  "]));
        let s = LlmSummarizer::new(llm.clone());
        let out = s
            .summarize(&["Opened notepad".to_string(), "Typed notes".to_string()])
            .await
            .unwrap();
        assert_eq!(out, "Opened notepad.exe and typed notes.");
        let prompt = &llm.call(0).unwrap()[0].content;
        assert!(prompt.contains("- Opened notepad\n- Typed notes"));
        assert!(prompt.contains("Keep filenames, error codes, and app names."));
    }

    #[tokio::test]
    async fn test_summarize_empty_reply_is_error() {
        let llm = Arc::new(ScriptedLlmClient::from_replies(["   "]));
        let s = LlmSummarizer::new(llm);
        let err = s.summarize(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, AgentError::SummarizationFailed(_)));
    }
}
