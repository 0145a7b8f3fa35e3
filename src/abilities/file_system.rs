//! 文件能力：read_file / write_file / list_files，均作用于调用任务自己的工作区

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::abilities::registry::str_arg;
use crate::abilities::{Ability, AbilityContext, AbilityOutput, AbilityParameter, ParameterType};
use crate::core::AgentError;

fn path_param(description: &str) -> AbilityParameter {
    AbilityParameter::required("path", ParameterType::String, description)
}

pub struct ReadFileAbility;

#[async_trait]
impl Ability for ReadFileAbility {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read data from a file in the task workspace"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![path_param("Path to the file")]
    }

    fn output_type(&self) -> &str {
        "bytes"
    }

    async fn execute(
        &self,
        ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let path = str_arg(&args, "path");
        tracing::info!(task_id = %ctx.task_id, path = %path, "read_file");
        Ok(AbilityOutput::Bytes(ctx.workspace.read(&ctx.task_id, path)?))
    }
}

pub struct WriteFileAbility;

#[async_trait]
impl Ability for WriteFileAbility {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write data to a file in the task workspace"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![
            path_param("Path to the file"),
            AbilityParameter::required("content", ParameterType::String, "Data to write to the file"),
        ]
    }

    fn output_type(&self) -> &str {
        "json"
    }

    async fn execute(
        &self,
        ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let path = str_arg(&args, "path");
        let content = str_arg(&args, "content");
        tracing::info!(task_id = %ctx.task_id, path = %path, bytes = content.len(), "write_file");
        ctx.workspace.write(&ctx.task_id, path, content.as_bytes())?;
        Ok(AbilityOutput::Json(json!({ "path": path, "bytes": content.len() })))
    }
}

pub struct ListFilesAbility;

#[async_trait]
impl Ability for ListFilesAbility {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory of the task workspace"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![AbilityParameter::optional(
            "path",
            ParameterType::String,
            "Path to the directory",
            json!("."),
        )]
    }

    fn output_type(&self) -> &str {
        "list[str]"
    }

    async fn execute(
        &self,
        ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let path = str_arg(&args, "path");
        tracing::info!(task_id = %ctx.task_id, path = %path, "list_files");
        let entries = ctx.workspace.list(&ctx.task_id, path)?;
        Ok(AbilityOutput::Json(json!(entries)))
    }
}
