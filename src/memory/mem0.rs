//! Mem0 兼容的向量记忆 HTTP 后端
//!
//! 对接 Mem0 REST 服务：`POST {base}/memories` 写入、`POST {base}/search` 检索。
//! 新旧版本的检索响应形态不同（数组或 `{results: [...]}`），交给 SearchResponse 统一处理。
//! 连接失败、非 2xx 状态一律报 MemoryBackendUnavailable，由引擎降级为空上下文。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::core::AgentError;
use crate::memory::vector::{SearchResponse, VectorMemoryStore};

pub struct Mem0HttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl Mem0HttpStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::ConfigError(format!("mem0 http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(self.endpoint(path));
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Token {}", key)),
            None => req,
        }
    }

    fn unavailable(e: impl std::fmt::Display) -> AgentError {
        AgentError::MemoryBackendUnavailable(format!("mem0: {}", e))
    }
}

#[async_trait]
impl VectorMemoryStore for Mem0HttpStore {
    async fn add(&self, text: &str, user_id: &str) -> Result<(), AgentError> {
        let body = json!({
            "messages": [{"role": "user", "content": text}],
            "user_id": user_id,
        });
        let resp = self
            .request("memories")
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        resp.error_for_status().map_err(Self::unavailable)?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<SearchResponse, AgentError> {
        let body = json!({
            "query": query,
            "user_id": user_id,
            "limit": limit,
        });
        let resp = self
            .request("search")
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?
            .error_for_status()
            .map_err(Self::unavailable)?;
        resp.json::<SearchResponse>().await.map_err(Self::unavailable)
    }
}
