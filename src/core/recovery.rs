//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供控制循环决定是冷却重试、跳过、作为观察写回还是终止。
//! 传播策略：单个工具调用或单次记忆写入的失败不会越过该调用；只有限流以外的推理故障会终止任务。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::RateLimited { .. } => RecoveryAction::Backoff,
            AgentError::ParseError { tool, reason } => {
                RecoveryAction::SkipCall(format!("Error executing {tool}: {reason}"))
            }
            AgentError::ToolNotFound(_) => RecoveryAction::Observe(format!("Error: {err}")),
            AgentError::ToolExecutionError { .. } => RecoveryAction::Observe(err.to_string()),
            AgentError::ToolTimeout(tool) => {
                RecoveryAction::Observe(format!("Error executing {tool}: timed out"))
            }
            AgentError::GraphWriteFailure(_)
            | AgentError::MemoryBackendUnavailable(_)
            | AgentError::SummarizationFailed(_) => RecoveryAction::Defer,
            AgentError::LlmError(_)
            | AgentError::FatalLoopError(_)
            | AgentError::Cancelled
            | AgentError::ConfigError(_) => RecoveryAction::Abort,
        }
    }
}
