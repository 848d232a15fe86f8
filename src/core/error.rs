//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 Backoff / SkipCall / Observe / Defer / Abort。

use thiserror::Error;

use crate::llm::LlmError;

/// 任务运行过程中可能出现的错误（解析、工具、限流、图谱写入、记忆后端等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 工具调用块格式错误（参数不是 JSON 对象等）
    #[error("Tool call parse error in '{tool}': {reason}")]
    ParseError { tool: String, reason: String },

    #[error("Function {0} not found.")]
    ToolNotFound(String),

    #[error("Error executing {tool}: {reason}")]
    ToolExecutionError { tool: String, reason: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 推理服务限流，冷却后重试当前轮
    #[error("Rate limited by reasoning service (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("LLM error: {0}")]
    LlmError(LlmError),

    #[error("Graph write failure: {0}")]
    GraphWriteFailure(String),

    #[error("Memory backend unavailable: {0}")]
    MemoryBackendUnavailable(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    /// 未归类的故障（截屏、推理、分发），直接终止任务
    #[error("Fatal loop error: {0}")]
    FatalLoopError(String),

    #[error("Cancelled by emergency stop")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited { retry_after_ms } => AgentError::RateLimited { retry_after_ms },
            other => AgentError::LlmError(other),
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::GraphWriteFailure(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 进入 AwaitingBackoff，冷却后以同一轮次重试
    Backoff,
    /// 跳过当前工具调用块，把错误作为观察写回对话
    SkipCall(String),
    /// 作为普通观察写回对话，由模型自行纠正
    Observe(String),
    /// 记忆写入失败：记录日志，合并延后
    Defer,
    /// 终止当前任务
    Abort,
}
