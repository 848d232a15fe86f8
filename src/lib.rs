//! bee-desk - 闭环桌面智能体与情景记忆
//!
//! 模块划分：
//! - **agent**: 按配置装配组件并运行任务
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复动作、任务状态机、急停
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 脚本化 Mock）、摘要器
//! - **memory**: 对话记录、短期缓冲、会话步骤图谱、向量记忆、情景记忆引擎
//! - **react**: Planner、任务控制循环、过程事件
//! - **tools**: 桌面动作目录、Desktop 接口、执行器、工具调用解析

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
