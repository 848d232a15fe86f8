//! LLM 层：推理客户端抽象与实现（OpenAI 兼容 / 脚本化 Mock）、摘要服务

pub mod mock;
pub mod openai;
pub mod summarizer;
pub mod traits;

pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use summarizer::{LlmSummarizer, Summarizer};
pub use traits::{LlmClient, LlmError};
