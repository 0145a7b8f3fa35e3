//! 任务 / 步骤 / 产物存储
//!
//! AgentDb 定义存储契约，控制循环只通过它读写记录；默认使用内存实现，
//! 启用 `async-sqlite` feature 后可换成 SQLite 持久化。

pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

pub use memory::InMemoryDb;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteDb;

/// 创建任务的请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    pub input: String,
    #[serde(default)]
    pub additional_input: Value,
}

impl TaskRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            additional_input: Value::Null,
        }
    }
}

/// 执行一步的请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepRequest {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub additional_input: Value,
}

/// 任务记录：创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub input: String,
    pub additional_input: Value,
    pub created_at: DateTime<Utc>,
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Created,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Created => "created",
            StepStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(StepStatus::Created),
            "completed" => Some(StepStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤记录：每次 execute_step 创建一条，由控制循环原地修改后持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub task_id: String,
    pub name: Option<String>,
    pub input: Option<String>,
    pub additional_input: Value,
    pub output: Option<Value>,
    pub status: StepStatus,
    pub is_last: bool,
    pub created_at: DateTime<Utc>,
}

/// 产物记录：指向任务工作区内的文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub task_id: String,
    pub file_name: String,
    pub relative_path: String,
    pub agent_created: bool,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// 产物在任务工作区内的相对路径（relative_path/file_name）
    pub fn workspace_path(&self) -> String {
        let dir = self.relative_path.trim_end_matches('/');
        if dir.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", dir, self.file_name)
        }
    }
}

/// 存储接口：任务、步骤、产物
#[async_trait]
pub trait AgentDb: Send + Sync {
    async fn create_task(&self, request: &TaskRequest) -> Result<Task, AgentError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, AgentError>;

    async fn list_tasks(&self) -> Result<Vec<Task>, AgentError>;

    async fn create_step(
        &self,
        task_id: &str,
        request: &StepRequest,
        is_last: bool,
    ) -> Result<Step, AgentError>;

    async fn get_step(&self, task_id: &str, step_id: &str) -> Result<Step, AgentError>;

    /// 覆盖写入步骤（按 step_id 定位）
    async fn update_step(&self, step: &Step) -> Result<(), AgentError>;

    async fn list_steps(&self, task_id: &str) -> Result<Vec<Step>, AgentError>;

    async fn create_artifact(
        &self,
        task_id: &str,
        file_name: &str,
        relative_path: &str,
        agent_created: bool,
    ) -> Result<Artifact, AgentError>;

    async fn get_artifact(&self, task_id: &str, artifact_id: &str) -> Result<Artifact, AgentError>;

    async fn list_artifacts(&self, task_id: &str) -> Result<Vec<Artifact>, AgentError>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
