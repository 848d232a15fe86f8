//! 任务运行时装配
//!
//! create_mission_components 按配置构建推理客户端、摘要器、图谱与向量后端、执行器，
//! run 以这些组件跑一次任务。真实的桌面自动化由调用方以 Desktop 实现注入。

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, GraphBackend, VectorBackend};
use crate::core::{AgentError, MissionReport, RecoveryEngine};
use crate::llm::{LlmClient, LlmSummarizer, OpenAiClient};
use crate::memory::{
    EpisodicMemory, InMemoryGraphStore, InMemoryVectorStore, Mem0HttpStore, SessionGraphStore,
    SqliteGraphStore, VectorMemoryStore,
};
use crate::react::{default_system_prompt, run_mission, MissionConfig, MissionEvent, MissionSession, Planner};
use crate::tools::{ActionExecutor, Desktop};

/// 预构建的任务组件
pub struct MissionComponents {
    pub planner: Planner,
    pub executor: ActionExecutor,
    pub memory: EpisodicMemory,
    pub recovery: RecoveryEngine,
    pub mission: MissionConfig,
}

/// 读取自定义 system prompt；文件缺失时回退到内置 prompt
pub fn load_system_prompt(path: Option<&Path>, completion_token: &str) -> String {
    match path.map(std::fs::read_to_string) {
        Some(Ok(prompt)) if !prompt.trim().is_empty() => prompt,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "system prompt file unreadable, using built-in prompt");
            default_system_prompt(completion_token)
        }
        _ => default_system_prompt(completion_token),
    }
}

/// 推理服务必须有 API Key，缺失即启动失败
fn reasoning_client(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let api_key = std::env::var(&cfg.llm.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            AgentError::ConfigError(format!("{} not found in environment", cfg.llm.api_key_env))
        })?;
    tracing::info!(model = %cfg.llm.model, "Using reasoning LLM");
    Ok(Arc::new(
        OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(&api_key))
            .with_max_tokens(cfg.llm.max_tokens),
    ))
}

fn summarizer_client(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let s = &cfg.llm.summarizer;
    // 本地 Ollama 不校验 key
    let api_key = s
        .api_key_env
        .as_ref()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| "ollama".to_string());
    tracing::info!(model = %s.model, "Using summarizer LLM");
    Arc::new(OpenAiClient::new(s.base_url.as_deref(), &s.model, Some(&api_key)))
}

fn graph_store(cfg: &AppConfig) -> Result<Arc<dyn SessionGraphStore>, AgentError> {
    Ok(match cfg.memory.graph_backend {
        GraphBackend::Sqlite => Arc::new(SqliteGraphStore::open(&cfg.memory.sqlite_path)?),
        GraphBackend::Memory => Arc::new(InMemoryGraphStore::new()),
    })
}

fn vector_store(cfg: &AppConfig) -> Result<Arc<dyn VectorMemoryStore>, AgentError> {
    Ok(match cfg.memory.vector_backend {
        VectorBackend::Memory => Arc::new(InMemoryVectorStore::new(cfg.memory.max_fragments)),
        VectorBackend::Mem0 => {
            let m = &cfg.memory.mem0;
            let api_key = m.api_key_env.as_ref().and_then(|name| std::env::var(name).ok());
            Arc::new(Mem0HttpStore::new(m.base_url.clone(), api_key, m.timeout_secs)?)
        }
    })
}

/// 按配置构建全部组件
pub fn create_mission_components(
    cfg: &AppConfig,
    desktop: Arc<dyn Desktop>,
) -> Result<MissionComponents, AgentError> {
    let llm = reasoning_client(cfg)?;
    let summarizer_llm = summarizer_client(cfg);

    let memory = EpisodicMemory::new(
        graph_store(cfg)?,
        vector_store(cfg)?,
        Arc::new(LlmSummarizer::new(summarizer_llm.clone())),
        cfg.app.user_id.clone(),
    )
    .with_config(cfg.memory.episodic_config());

    let system_prompt = load_system_prompt(
        cfg.agent.system_prompt_path.as_deref(),
        &cfg.agent.completion_token,
    );

    Ok(MissionComponents {
        planner: Planner::new(llm, system_prompt),
        executor: ActionExecutor::new(desktop, cfg.tools.tool_timeout_secs)
            .with_hotkey_advisor(summarizer_llm),
        memory,
        recovery: RecoveryEngine::new(),
        mission: cfg.agent.mission_config(),
    })
}

/// 跑一次任务；event_tx 可选
pub async fn run(
    components: &MissionComponents,
    goal: &str,
    cancel_token: CancellationToken,
    event_tx: Option<&mpsc::UnboundedSender<MissionEvent>>,
) -> MissionReport {
    let mut session = MissionSession::new(
        &components.planner,
        &components.executor,
        &components.memory,
        &components.recovery,
        cancel_token,
    )
    .with_config(components.mission.clone());
    if let Some(tx) = event_tx {
        session = session.with_event_tx(tx);
    }
    run_mission(&session, goal).await
}
