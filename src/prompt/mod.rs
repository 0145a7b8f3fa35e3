//! Prompt 模板
//!
//! 按模型名与模板名查找模板：先 `<prompts_dir>/<model>/<name>.txt`，再 `<prompts_dir>/<name>.txt`，
//! 最后回退到内置模板。模板中的 `{key}` 由调用方传入的替换项填充，`{answer_schema}` 总是可用。

pub mod schema;

use std::path::PathBuf;

use crate::core::AgentError;

pub use schema::answer_schema_json;

const SYSTEM_FORMAT: &str = "\
You are an autonomous agent that completes tasks by invoking abilities, one per reply.
Work independently: never ask the user for help or clarification.

Reply ONLY with a single JSON object that matches this JSON Schema, with no surrounding text:
{answer_schema}

Call the `finish` ability with a short reason as soon as the task is done.";

const TASK_STEP: &str = "\
Your task is:

{task}

You have access to the following abilities:
{abilities}

Pick the single most useful ability for the next step and answer in the required JSON format.";

/// 模板引擎：绑定模型名与可选覆盖目录
#[derive(Debug, Clone)]
pub struct PromptEngine {
    model: String,
    prompts_dir: Option<PathBuf>,
}

impl PromptEngine {
    pub fn new(model: impl Into<String>, prompts_dir: Option<PathBuf>) -> Self {
        Self {
            model: model.into(),
            prompts_dir,
        }
    }

    fn builtin(name: &str) -> Option<&'static str> {
        match name {
            "system-format" => Some(SYSTEM_FORMAT),
            "task-step" => Some(TASK_STEP),
            _ => None,
        }
    }

    fn find_template(&self, name: &str) -> Result<String, AgentError> {
        if let Some(dir) = &self.prompts_dir {
            let candidates = [
                dir.join(&self.model).join(format!("{name}.txt")),
                dir.join(format!("{name}.txt")),
            ];
            if let Some(text) = candidates
                .iter()
                .find_map(|p| std::fs::read_to_string(p).ok())
            {
                return Ok(text);
            }
        }
        Self::builtin(name)
            .map(String::from)
            .ok_or_else(|| AgentError::Prompt(format!("template not found: {name}")))
    }

    /// 加载并渲染模板；未提供的占位符原样保留
    pub fn load_prompt(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, AgentError> {
        let mut text = self.find_template(name)?;
        for (key, value) in vars {
            text = text.replace(&format!("{{{key}}}"), value);
        }
        if text.contains("{answer_schema}") {
            text = text.replace("{answer_schema}", &answer_schema_json());
        }
        Ok(text)
    }
}
