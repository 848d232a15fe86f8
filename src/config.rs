//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__AGENT__MAX_TURNS=20`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::memory::EpisodicConfig;
use crate::react::MissionConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 长期记忆按用户隔离
    pub user_id: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            user_id: "demo_agent".to_string(),
        }
    }
}

/// [agent] 段：控制循环
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_turns: usize,
    pub settle_delay_secs: u64,
    pub rate_limit_cooldown_secs: u64,
    pub completion_token: String,
    /// 自定义 system prompt 文件；未设置时使用内置 prompt
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        let defaults = MissionConfig::default();
        Self {
            max_turns: defaults.max_turns,
            settle_delay_secs: defaults.settle_delay.as_secs(),
            rate_limit_cooldown_secs: defaults.rate_limit_cooldown.as_secs(),
            completion_token: defaults.completion_token,
            system_prompt_path: None,
        }
    }
}

impl AgentSection {
    pub fn mission_config(&self) -> MissionConfig {
        MissionConfig {
            max_turns: self.max_turns,
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            completion_token: self.completion_token.clone(),
        }
    }
}

/// [llm] 段：推理服务（OpenAI 兼容端点）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: String,
    /// 读取 API Key 的环境变量名
    pub api_key_env: String,
    pub max_tokens: u32,
    pub summarizer: SummarizerSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: Some("https://api.groq.com/openai/v1".to_string()),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            max_tokens: 1024,
            summarizer: SummarizerSection::default(),
        }
    }
}

/// [llm.summarizer] 段：本地摘要模型（Ollama 的 OpenAI 兼容端点）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerSection {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key_env: Option<String>,
}

impl Default for SummarizerSection {
    fn default() -> Self {
        Self {
            base_url: Some("http://localhost:11434/v1".to_string()),
            model: "llama3.2".to_string(),
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Memory,
    Mem0,
}

/// [memory] 段：情景记忆
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub consolidation_window: u64,
    pub buffer_threshold: usize,
    pub retrieve_limit: usize,
    pub graph_backend: GraphBackend,
    pub sqlite_path: PathBuf,
    pub vector_backend: VectorBackend,
    /// 内存向量库最多保留的片段数
    pub max_fragments: usize,
    pub mem0: Mem0Section,
}

impl Default for MemorySection {
    fn default() -> Self {
        let defaults = EpisodicConfig::default();
        Self {
            consolidation_window: defaults.consolidation_window,
            buffer_threshold: defaults.buffer_threshold,
            retrieve_limit: defaults.retrieve_limit,
            graph_backend: GraphBackend::default(),
            sqlite_path: PathBuf::from("memory/episodic.db"),
            vector_backend: VectorBackend::default(),
            max_fragments: 1000,
            mem0: Mem0Section::default(),
        }
    }
}

impl MemorySection {
    pub fn episodic_config(&self) -> EpisodicConfig {
        EpisodicConfig {
            consolidation_window: self.consolidation_window,
            buffer_threshold: self.buffer_threshold,
            retrieve_limit: self.retrieve_limit,
        }
    }
}

/// [memory.mem0] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Mem0Section {
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Mem0Section {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            api_key_env: Some("MEM0_API_KEY".to_string()),
            timeout_secs: 10,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
