//! Forge - Rust 任务执行智能体
//!
//! 模块划分：
//! - **agent**: 控制循环（create_task / execute_step）与任务、步骤、产物访问
//! - **abilities**: 能力 trait、带参数校验的注册表、内置能力（网页、金融数据、文件、finish）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **db**: 任务 / 步骤 / 产物存储（内存 / SQLite）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话缓冲区
//! - **prompt**: Prompt 模板与回复格式 Schema
//! - **session**: 按任务划分的对话存储
//! - **workspace**: 按任务隔离的沙箱文件系统

pub mod abilities;
pub mod agent;
pub mod config;
pub mod core;
pub mod db;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod session;
pub mod workspace;

pub use agent::{create_agent, Agent, LoopSettings, StepOutcome};
