//! 情景记忆引擎
//!
//! 同时维护两份记忆，并在超过阈值时各自压缩，保持事件的因果顺序：
//! - 持久图谱：log_step 逐步写入；步号为窗口大小的整数倍时 consolidate 把刚结束的窗口换成 SummaryStep
//! - 短期缓冲：prune_buffer 把最旧的一段换成 `[Previous Context: ...]`，摘要同时写入向量记忆
//!
//! 两种压缩互不影响。记忆写入失败只记录日志，不会中断任务；检索不可用时返回空上下文。

use std::sync::Arc;

use chrono::Utc;

use crate::core::AgentError;
use crate::llm::Summarizer;
use crate::memory::buffer::PREVIOUS_CONTEXT_PREFIX;
use crate::memory::graph::{
    ChainNode, GraphStats, SessionGraphStore, StatsScope, StepRecord, SummaryRecord,
};
use crate::memory::vector::VectorMemoryStore;

pub const DEFAULT_CONSOLIDATION_WINDOW: u64 = 5;
pub const DEFAULT_BUFFER_THRESHOLD: usize = 5;
pub const DEFAULT_RETRIEVE_LIMIT: usize = 3;

#[derive(Debug, Clone)]
pub struct EpisodicConfig {
    pub consolidation_window: u64,
    pub buffer_threshold: usize,
    pub retrieve_limit: usize,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            consolidation_window: DEFAULT_CONSOLIDATION_WINDOW,
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            retrieve_limit: DEFAULT_RETRIEVE_LIMIT,
        }
    }
}

/// consolidate 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Consolidation {
    Consolidated(SummaryRecord),
    /// 窗口内已无 Step（已合并过或越界）
    NoOp,
}

pub struct EpisodicMemory {
    graph: Arc<dyn SessionGraphStore>,
    vectors: Arc<dyn VectorMemoryStore>,
    summarizer: Arc<dyn Summarizer>,
    user_id: String,
    config: EpisodicConfig,
}

impl EpisodicMemory {
    pub fn new(
        graph: Arc<dyn SessionGraphStore>,
        vectors: Arc<dyn VectorMemoryStore>,
        summarizer: Arc<dyn Summarizer>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            vectors,
            summarizer,
            user_id: user_id.into(),
            config: EpisodicConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EpisodicConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &EpisodicConfig {
        &self.config
    }

    /// 记录一步。步号须比链上最新步号（或摘要 end_step）大 1，由调用方按会话串行保证。
    /// 写入成功且步号是窗口整数倍时，合并刚结束的窗口；合并失败只记日志（窗口保持未合并）。
    pub async fn log_step(
        &self,
        session_id: &str,
        step_number: u64,
        action_type: &str,
        description: &str,
    ) -> Result<(), AgentError> {
        let step = StepRecord::new(step_number, action_type, description);
        if let Err(e) = self.graph.append_step(session_id, &step) {
            tracing::warn!(session_id, step = step_number, error = %e, "log_step failed");
            return Err(match e {
                AgentError::GraphWriteFailure(_) => e,
                other => AgentError::GraphWriteFailure(other.to_string()),
            });
        }
        tracing::debug!(session_id, step = step_number, action_type, "step logged");

        let window = self.config.consolidation_window;
        if window > 0 && step_number % window == 0 {
            if let Err(e) = self.consolidate(session_id, step_number, window).await {
                tracing::warn!(
                    session_id,
                    end_step = step_number,
                    error = %e,
                    "consolidation deferred"
                );
            }
        }
        Ok(())
    }

    /// 把 `[end_step - window_size + 1, end_step]` 内的 Step 换成一个 SummaryStep（单事务）
    pub async fn consolidate(
        &self,
        session_id: &str,
        end_step: u64,
        window_size: u64,
    ) -> Result<Consolidation, AgentError> {
        let window_size = window_size.max(1);
        let window_start = (end_step + 1).saturating_sub(window_size).max(1);
        if window_start > end_step {
            return Ok(Consolidation::NoOp);
        }
        let steps = self.graph.steps_in_range(session_id, window_start, end_step)?;
        // 窗口前段可能已被更早的摘要吸收，区间从实际剩下的最小步号起算
        let Some(start_step) = steps.first().map(|s| s.step_number) else {
            tracing::debug!(session_id, window_start, end_step, "nothing to consolidate");
            return Ok(Consolidation::NoOp);
        };

        let descriptions: Vec<String> = steps.iter().map(|s| s.description.clone()).collect();
        let summary = self.summarizer.summarize(&descriptions).await?;
        let record = SummaryRecord {
            summary,
            start_step,
            end_step,
            timestamp: Utc::now(),
        };
        if !self.graph.replace_window(session_id, &record)? {
            return Ok(Consolidation::NoOp);
        }
        tracing::info!(
            session_id,
            start_step,
            end_step,
            absorbed = steps.len(),
            summary = %record.summary,
            "window consolidated"
        );
        Ok(Consolidation::Consolidated(record))
    }

    /// 短期缓冲剪枝：长度 <= 阈值原样返回；否则最旧的阈值条摘要为一句，写入长期记忆，
    /// 返回 `["[Previous Context: {summary}]"] + 其余`。摘要失败时原样返回。
    pub async fn prune_buffer(&self, buffer: Vec<String>) -> Vec<String> {
        let threshold = self.config.buffer_threshold;
        if buffer.len() <= threshold {
            return buffer;
        }
        tracing::info!(pruning = threshold, "pruning short-term buffer");

        let summary = match self.summarizer.summarize(&buffer[..threshold]).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "buffer summarization failed, keeping buffer");
                return buffer;
            }
        };
        tracing::info!(summary = %summary, "generated buffer summary");

        if let Err(e) = self.vectors.add(&summary, &self.user_id).await {
            tracing::warn!(user_id = %self.user_id, error = %e, "long-term memory write failed");
        }

        let mut pruned = Vec::with_capacity(buffer.len() - threshold + 1);
        pruned.push(format!("{} {}]", PREVIOUS_CONTEXT_PREFIX, summary));
        pruned.extend(buffer.into_iter().skip(threshold));
        pruned
    }

    /// 按相关度返回历史片段；存储为空或不可用时返回空列表
    pub async fn retrieve_context(&self, user_id: &str, query: &str, limit: usize) -> Vec<String> {
        match self.vectors.search(query, user_id, limit).await {
            Ok(resp) => {
                let mut texts = resp.into_texts();
                texts.truncate(limit);
                texts
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "memory retrieval unavailable, continuing without context");
                Vec::new()
            }
        }
    }

    /// 尽力统计；后端失败返回 0
    pub fn get_stats(&self, scope: StatsScope<'_>) -> GraphStats {
        self.graph.stats(scope).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "graph stats unavailable");
            GraphStats::default()
        })
    }

    /// 会话时间线（链首到 head）
    pub fn timeline(&self, session_id: &str) -> Result<Vec<ChainNode>, AgentError> {
        self.graph.chain(session_id)
    }

    pub fn summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, AgentError> {
        self.graph.summaries(session_id)
    }
}
