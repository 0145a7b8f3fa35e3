//! SQLite 存储：任务、步骤、产物跨进程持久化
//!
//! JSON 字段（additional_input / output）以文本列保存，时间以 RFC3339 文本保存。

#![cfg(feature = "async-sqlite")]

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{new_id, AgentDb, Artifact, Step, StepRequest, StepStatus, Task, TaskRequest};
use crate::core::AgentError;

/// SQLite 版 AgentDb
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// 打开（不存在则创建）数据库文件并建表
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let db = Self { pool };
        db.init_tables().await?;
        Ok(db)
    }

    async fn init_tables(&self) -> Result<(), AgentError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                input TEXT NOT NULL,
                additional_input TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS steps (
                step_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                name TEXT,
                input TEXT,
                additional_input TEXT NOT NULL,
                output TEXT,
                status TEXT NOT NULL,
                is_last INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS artifacts (
                artifact_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                agent_created INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_steps_task ON steps(task_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn ensure_task(&self, task_id: &str) -> Result<(), AgentError> {
        self.get_task(task_id).await.map(|_| ())
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, AgentError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AgentError::Store(format!("bad timestamp '{s}': {e}")))
}

fn parse_json(s: &str) -> Result<Value, AgentError> {
    serde_json::from_str(s).map_err(|e| AgentError::Store(format!("bad json column: {e}")))
}

fn task_from_row(row: &SqliteRow) -> Result<Task, AgentError> {
    let additional: String = row.get("additional_input");
    let created: String = row.get("created_at");
    Ok(Task {
        task_id: row.get("task_id"),
        input: row.get("input"),
        additional_input: parse_json(&additional)?,
        created_at: parse_time(&created)?,
    })
}

fn step_from_row(row: &SqliteRow) -> Result<Step, AgentError> {
    let additional: String = row.get("additional_input");
    let output: Option<String> = row.get("output");
    let status: String = row.get("status");
    let is_last: i64 = row.get("is_last");
    let created: String = row.get("created_at");
    Ok(Step {
        step_id: row.get("step_id"),
        task_id: row.get("task_id"),
        name: row.get("name"),
        input: row.get("input"),
        additional_input: parse_json(&additional)?,
        output: output.as_deref().map(parse_json).transpose()?,
        status: StepStatus::parse(&status)
            .ok_or_else(|| AgentError::Store(format!("bad step status '{status}'")))?,
        is_last: is_last != 0,
        created_at: parse_time(&created)?,
    })
}

fn artifact_from_row(row: &SqliteRow) -> Result<Artifact, AgentError> {
    let agent_created: i64 = row.get("agent_created");
    let created: String = row.get("created_at");
    Ok(Artifact {
        artifact_id: row.get("artifact_id"),
        task_id: row.get("task_id"),
        file_name: row.get("file_name"),
        relative_path: row.get("relative_path"),
        agent_created: agent_created != 0,
        created_at: parse_time(&created)?,
    })
}

#[async_trait]
impl AgentDb for SqliteDb {
    async fn create_task(&self, request: &TaskRequest) -> Result<Task, AgentError> {
        let task = Task {
            task_id: new_id(),
            input: request.input.clone(),
            additional_input: request.additional_input.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO tasks (task_id, input, additional_input, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&task.task_id)
        .bind(&task.input)
        .bind(task.additional_input.to_string())
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, AgentError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AgentError::TaskNotFound(task_id.to_string()))?;
        task_from_row(&row)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, AgentError> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn create_step(
        &self,
        task_id: &str,
        request: &StepRequest,
        is_last: bool,
    ) -> Result<Step, AgentError> {
        self.ensure_task(task_id).await?;
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
        sqlx::query(
            "INSERT INTO steps (step_id, task_id, name, input, additional_input, output, status, is_last, created_at)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?, ?)",
        )
        .bind(&step.step_id)
        .bind(&step.task_id)
        .bind(&step.name)
        .bind(&step.input)
        .bind(step.additional_input.to_string())
        .bind(step.status.as_str())
        .bind(step.is_last as i64)
        .bind(step.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(step)
    }

    async fn get_step(&self, task_id: &str, step_id: &str) -> Result<Step, AgentError> {
        let row = sqlx::query("SELECT * FROM steps WHERE task_id = ? AND step_id = ?")
            .bind(task_id)
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AgentError::StepNotFound(step_id.to_string()))?;
        step_from_row(&row)
    }

    async fn update_step(&self, step: &Step) -> Result<(), AgentError> {
        let result = sqlx::query(
            "UPDATE steps SET name = ?, output = ?, status = ?, is_last = ? WHERE step_id = ?",
        )
        .bind(&step.name)
        .bind(step.output.as_ref().map(|v| v.to_string()))
        .bind(step.status.as_str())
        .bind(step.is_last as i64)
        .bind(&step.step_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AgentError::StepNotFound(step.step_id.clone()));
        }
        Ok(())
    }

    async fn list_steps(&self, task_id: &str) -> Result<Vec<Step>, AgentError> {
        self.ensure_task(task_id).await?;
        let rows = sqlx::query("SELECT * FROM steps WHERE task_id = ? ORDER BY created_at, rowid")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(step_from_row).collect()
    }

    async fn create_artifact(
        &self,
        task_id: &str,
        file_name: &str,
        relative_path: &str,
        agent_created: bool,
    ) -> Result<Artifact, AgentError> {
        self.ensure_task(task_id).await?;
        let artifact = Artifact {
            artifact_id: new_id(),
            task_id: task_id.to_string(),
            file_name: file_name.to_string(),
            relative_path: relative_path.to_string(),
            agent_created,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO artifacts (artifact_id, task_id, file_name, relative_path, agent_created, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&artifact.artifact_id)
        .bind(&artifact.task_id)
        .bind(&artifact.file_name)
        .bind(&artifact.relative_path)
        .bind(artifact.agent_created as i64)
        .bind(artifact.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(artifact)
    }

    async fn get_artifact(&self, task_id: &str, artifact_id: &str) -> Result<Artifact, AgentError> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE task_id = ? AND artifact_id = ?")
            .bind(task_id)
            .bind(artifact_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AgentError::ArtifactNotFound(artifact_id.to_string()))?;
        artifact_from_row(&row)
    }

    async fn list_artifacts(&self, task_id: &str) -> Result<Vec<Artifact>, AgentError> {
        self.ensure_task(task_id).await?;
        let rows =
            sqlx::query("SELECT * FROM artifacts WHERE task_id = ? ORDER BY created_at, rowid")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(artifact_from_row).collect()
    }
}

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_step_update_persists() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDb::new(dir.path().join("agent.db")).await.unwrap();

        let task = db.create_task(&TaskRequest::new("persist me")).await.unwrap();
        let mut step = db
            .create_step(&task.task_id, &StepRequest::default(), false)
            .await
            .unwrap();
        step.output = Some(serde_json::json!({"speak": "hi"}));
        step.is_last = true;
        step.status = StepStatus::Completed;
        db.update_step(&step).await.unwrap();

        let stored = db.get_step(&task.task_id, &step.step_id).await.unwrap();
        assert_eq!(stored.output, step.output);
        assert!(stored.is_last);
        assert_eq!(stored.status, StepStatus::Completed);
        assert_eq!(db.get_task(&task.task_id).await.unwrap().input, "persist me");
    }

    #[tokio::test]
    async fn test_sqlite_missing_task() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDb::new(dir.path().join("agent.db")).await.unwrap();
        assert!(matches!(
            db.list_steps("nope").await,
            Err(AgentError::TaskNotFound(_))
        ));
    }
}
