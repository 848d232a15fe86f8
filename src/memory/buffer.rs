//! 短期缓冲：本次任务内的滚动对话痕迹（不持久化）
//!
//! 每轮追加一条 `Response: ...`；长度达到阈值后由 EpisodicMemory::prune_buffer 把最旧的一段替换为
//! `[Previous Context: ...]`。生命周期与单次任务相同，由控制循环显式持有。

/// 剪枝后摘要条目的前缀
pub const PREVIOUS_CONTEXT_PREFIX: &str = "[Previous Context:";

#[derive(Debug, Clone)]
pub struct ShortTermBuffer {
    entries: Vec<String>,
    threshold: usize,
}

impl ShortTermBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
        }
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 达到阈值即交给剪枝（剪枝本身在 <= 阈值时原样返回）
    pub fn needs_pruning(&self) -> bool {
        self.entries.len() >= self.threshold
    }

    /// 取出全部条目（剪枝时先取出、再放回结果）
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.entries)
    }

    pub fn replace(&mut self, entries: Vec<String>) {
        self.entries = entries;
    }
}
