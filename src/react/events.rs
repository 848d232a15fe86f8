//! 任务过程事件：供 CLI / 前端展示每轮的思考、工具调用、观察与终止

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionEvent {
    /// 第几轮开始（从 1 计）
    TurnStarted { turn: usize, max_turns: usize },
    /// 正在调用推理服务
    Thinking,
    /// 模型回复全文
    Reply { text: String },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具调用块无法解析，已跳过
    ParseFailure { tool: String, reason: String },
    /// 限流冷却
    Backoff { turn: usize, cooldown_secs: u64 },
    /// 短期缓冲被剪枝（剪枝前后长度）
    Pruned { before: usize, after: usize },
    Completed { turns: usize },
    Aborted { reason: String },
}
