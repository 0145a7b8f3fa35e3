//! 内存存储：进程内 HashMap + 插入顺序索引，进程退出即丢失

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{new_id, AgentDb, Artifact, Step, StepRequest, StepStatus, Task, TaskRequest};
use crate::core::AgentError;

#[derive(Default)]
struct Tables {
    tasks: HashMap<String, Task>,
    task_order: Vec<String>,
    /// task_id -> 按创建顺序的步骤
    steps: HashMap<String, Vec<Step>>,
    artifacts: HashMap<String, Vec<Artifact>>,
}

/// 内存版 AgentDb
#[derive(Default)]
pub struct InMemoryDb {
    tables: RwLock<Tables>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentDb for InMemoryDb {
    async fn create_task(&self, request: &TaskRequest) -> Result<Task, AgentError> {
        let task = Task {
            task_id: new_id(),
            input: request.input.clone(),
            additional_input: request.additional_input.clone(),
            created_at: Utc::now(),
        };
        let mut t = self.tables.write().await;
        t.task_order.push(task.task_id.clone());
        t.tasks.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, AgentError> {
        self.tables
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| AgentError::TaskNotFound(task_id.to_string()))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, AgentError> {
        let t = self.tables.read().await;
        Ok(t.task_order
            .iter()
            .filter_map(|id| t.tasks.get(id).cloned())
            .collect())
    }

    async fn create_step(
        &self,
        task_id: &str,
        request: &StepRequest,
        is_last: bool,
    ) -> Result<Step, AgentError> {
        let mut t = self.tables.write().await;
        if !t.tasks.contains_key(task_id) {
            return Err(AgentError::TaskNotFound(task_id.to_string()));
        }
        let step = Step {
            step_id: new_id(),
            task_id: task_id.to_string(),
            name: None,
            input: request.input.clone(),
            additional_input: request.additional_input.clone(),
            output: None,
            status: StepStatus::Created,
            is_last,
            created_at: Utc::now(),
        };
        t.steps
            .entry(task_id.to_string())
            .or_default()
            .push(step.clone());
        Ok(step)
    }

    async fn get_step(&self, task_id: &str, step_id: &str) -> Result<Step, AgentError> {
        self.tables
            .read()
            .await
            .steps
            .get(task_id)
            .and_then(|steps| steps.iter().find(|s| s.step_id == step_id))
            .cloned()
            .ok_or_else(|| AgentError::StepNotFound(step_id.to_string()))
    }

    async fn update_step(&self, step: &Step) -> Result<(), AgentError> {
        let mut t = self.tables.write().await;
        let slot = t
            .steps
            .get_mut(&step.task_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.step_id == step.step_id))
            .ok_or_else(|| AgentError::StepNotFound(step.step_id.clone()))?;
        *slot = step.clone();
        Ok(())
    }

    async fn list_steps(&self, task_id: &str) -> Result<Vec<Step>, AgentError> {
        let t = self.tables.read().await;
        if !t.tasks.contains_key(task_id) {
            return Err(AgentError::TaskNotFound(task_id.to_string()));
        }
        Ok(t.steps.get(task_id).cloned().unwrap_or_default())
    }

    async fn create_artifact(
        &self,
        task_id: &str,
        file_name: &str,
        relative_path: &str,
        agent_created: bool,
    ) -> Result<Artifact, AgentError> {
        let mut t = self.tables.write().await;
        if !t.tasks.contains_key(task_id) {
            return Err(AgentError::TaskNotFound(task_id.to_string()));
        }
        let artifact = Artifact {
            artifact_id: new_id(),
            task_id: task_id.to_string(),
            file_name: file_name.to_string(),
            relative_path: relative_path.to_string(),
            agent_created,
            created_at: Utc::now(),
        };
        t.artifacts
            .entry(task_id.to_string())
            .or_default()
            .push(artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, task_id: &str, artifact_id: &str) -> Result<Artifact, AgentError> {
        self.tables
            .read()
            .await
            .artifacts
            .get(task_id)
            .and_then(|list| list.iter().find(|a| a.artifact_id == artifact_id))
            .cloned()
            .ok_or_else(|| AgentError::ArtifactNotFound(artifact_id.to_string()))
    }

    async fn list_artifacts(&self, task_id: &str) -> Result<Vec<Artifact>, AgentError> {
        let t = self.tables.read().await;
        if !t.tasks.contains_key(task_id) {
            return Err(AgentError::TaskNotFound(task_id.to_string()));
        }
        Ok(t.artifacts.get(task_id).cloned().unwrap_or_default())
    }
}
