//! Agent 错误类型
//!
//! 按来源划分：存储（任务/步骤/产物不存在）、模型、能力调用、工作区路径逃逸与 I/O。
//! 模型与 JSON 错误在 execute_step 内被吸收为 Degraded；其余错误向调用方传播。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Step not found: {0}")]
    StepNotFound(String),
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("JSON parse error: {0}")]
    JsonParse(String),
    /// 注册表中不存在该能力名
    #[error("Unknown ability: {0}")]
    UnknownAbility(String),
    /// 参数与能力声明的 schema 不符（缺必填、类型不符、未声明的参数）
    #[error("Invalid arguments for ability '{ability}': {reason}")]
    InvalidArguments { ability: String, reason: String },
    #[error("Ability '{ability}' failed: {reason}")]
    AbilityFailed { ability: String, reason: String },
    #[error("Directory traversal is not allowed: {0}")]
    PathTraversal(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Prompt error: {0}")]
    Prompt(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn invalid_args(ability: &str, reason: impl Into<String>) -> Self {
        AgentError::InvalidArguments {
            ability: ability.to_string(),
            reason: reason.into(),
        }
    }

    pub fn ability_failed(ability: &str, reason: impl Into<String>) -> Self {
        AgentError::AbilityFailed {
            ability: ability.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::JsonParse(e.to_string())
    }
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for AgentError {
    fn from(e: sqlx::Error) -> Self {
        AgentError::Store(e.to_string())
    }
}
