//! 向量记忆（长期记忆）：按用户隔离的文本片段，按相似度检索
//!
//! 后端返回形态不统一：可能是片段数组 `[{memory, ...}]`，也可能是包装对象 `{results: [...]}`。
//! SearchResponse 统一反序列化后由 into_texts 拍平为文本列表。
//! 当前内置实现为 InMemoryVectorStore（关键词重叠），HTTP 后端见 mem0.rs。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::tokenizer::{overlap_score, tokenize_to_set};

/// 单条记忆片段（后端可能附带 id / score 等字段）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryFragment {
    pub memory: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl MemoryFragment {
    pub fn new(memory: impl Into<String>) -> Self {
        Self {
            memory: memory.into(),
            id: None,
            score: None,
        }
    }
}

/// 检索结果的几种形态
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Wrapped { results: Vec<MemoryFragment> },
    Bare(Vec<MemoryFragment>),
    /// 无法识别（如无 results 键的对象），视为空
    Other(serde_json::Value),
}

impl SearchResponse {
    /// 拍平为文本列表，保持后端给出的相关度顺序
    pub fn into_texts(self) -> Vec<String> {
        match self {
            SearchResponse::Wrapped { results } | SearchResponse::Bare(results) => {
                results.into_iter().map(|f| f.memory).collect()
            }
            SearchResponse::Other(_) => Vec::new(),
        }
    }
}

/// 向量记忆存储 trait
#[async_trait]
pub trait VectorMemoryStore: Send + Sync {
    async fn add(&self, text: &str, user_id: &str) -> Result<(), AgentError>;

    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<SearchResponse, AgentError>;
}

struct StoredFragment {
    user_id: String,
    text: String,
    tokens: HashSet<String>,
}

/// 进程内实现：按关键词重叠打分，超出容量时丢弃最旧的片段
pub struct InMemoryVectorStore {
    store: RwLock<Vec<StoredFragment>>,
    max_entries: usize,
}

impl InMemoryVectorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> AgentError {
        AgentError::MemoryBackendUnavailable("in-memory vector store lock poisoned".to_string())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl VectorMemoryStore for InMemoryVectorStore {
    async fn add(&self, text: &str, user_id: &str) -> Result<(), AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let mut store = self.store.write().map_err(|_| Self::poisoned())?;
        store.push(StoredFragment {
            user_id: user_id.to_string(),
            text: text.to_string(),
            tokens: tokenize_to_set(text),
        });
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<SearchResponse, AgentError> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() || limit == 0 {
            return Ok(SearchResponse::Bare(Vec::new()));
        }
        let store = self.store.read().map_err(|_| Self::poisoned())?;
        let mut scored: Vec<(usize, &StoredFragment)> = store
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| (overlap_score(&query_tokens, &f.tokens), f))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let results = scored
            .into_iter()
            .take(limit)
            .map(|(score, f)| MemoryFragment {
                memory: f.text.clone(),
                id: None,
                score: Some(score as f64),
            })
            .collect();
        Ok(SearchResponse::Wrapped { results })
    }
}
