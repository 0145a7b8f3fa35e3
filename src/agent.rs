//! Agent 控制循环
//!
//! create_task 创建任务并重置该任务的对话；execute_step 每次推进一步：
//! 对话不足 seed_threshold 条时播种 system + task prompt -> 整段对话发给 LLM（JSON 输出）->
//! 解析回复中的 ability 指令并执行 -> 回复（附 output）作为 assistant 消息追加 ->
//! 对话达到 max_messages 条时强制标记 is_last。
//!
//! 模型调用失败或回复无法解析时不报错，返回 StepOutcome::Degraded 且不修改对话；
//! 存储、能力执行、工作区错误作为 Err 传播给调用方。

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::abilities::{builtin_registry, AbilityRegistry, FINISH_ABILITY};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::db::{AgentDb, Artifact, InMemoryDb, Step, StepRequest, StepStatus, Task, TaskRequest};
use crate::llm::{create_llm_from_config, LlmClient, TokenUsage};
use crate::memory::Message;
use crate::prompt::PromptEngine;
use crate::session::SessionStore;
use crate::workspace::{LocalWorkspace, Workspace};

/// 日志中任务输入预览的最大字符数
const INPUT_PREVIEW_CHARS: usize = 40;

/// 控制循环参数
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// 发给 LLM 的模型名，同时决定 prompt 模板目录
    pub model: String,
    pub seed_threshold: usize,
    pub max_messages: usize,
    pub system_template: String,
    pub task_template: String,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl LoopSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            seed_threshold: cfg.agent.seed_threshold,
            max_messages: cfg.agent.max_messages,
            system_template: cfg.agent.system_template.clone(),
            task_template: cfg.agent.task_template.clone(),
        }
    }
}

/// 单步结果：正常推进，或模型回复不可用时的降级（步骤保持刚创建时的状态）
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Advanced(Step),
    Degraded { step: Step, reason: String },
}

impl StepOutcome {
    pub fn step(&self) -> &Step {
        match self {
            StepOutcome::Advanced(step) | StepOutcome::Degraded { step, .. } => step,
        }
    }

    pub fn into_step(self) -> Step {
        match self {
            StepOutcome::Advanced(step) | StepOutcome::Degraded { step, .. } => step,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StepOutcome::Degraded { .. })
    }
}

/// 从回复中提取的能力调用：仅当 ability 为对象且 name 为字符串、args 为对象时成立
#[derive(Debug, Clone, PartialEq)]
struct AbilityDirective {
    name: String,
    args: Value,
}

impl AbilityDirective {
    fn from_answer(answer: &Map<String, Value>) -> Option<Self> {
        let ability = answer.get("ability")?.as_object()?;
        let name = ability.get("name")?.as_str()?;
        let args = ability.get("args")?;
        if !args.is_object() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args: args.clone(),
        })
    }
}

/// 任务输入预览：超过 max 个字符时截断并追加 ...
fn input_preview(input: &str, max: usize) -> String {
    if input.chars().count() > max {
        format!("{}...", input.chars().take(max).collect::<String>())
    } else {
        input.to_string()
    }
}

/// JSON 中的「真值」对象：非空对象才算有效回复
fn truthy_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

/// Agent：持有存储、工作区、能力注册表、LLM 与按任务划分的对话
pub struct Agent {
    db: Arc<dyn AgentDb>,
    workspace: Arc<dyn Workspace>,
    abilities: AbilityRegistry,
    llm: Arc<dyn LlmClient>,
    prompts: PromptEngine,
    sessions: SessionStore,
    settings: LoopSettings,
}

impl Agent {
    pub fn new(
        db: Arc<dyn AgentDb>,
        workspace: Arc<dyn Workspace>,
        abilities: AbilityRegistry,
        llm: Arc<dyn LlmClient>,
        prompts: PromptEngine,
        settings: LoopSettings,
    ) -> Self {
        Self {
            db,
            workspace,
            abilities,
            llm,
            prompts,
            sessions: SessionStore::new(),
            settings,
        }
    }

    /// 模型客户端的累计 token 用量
    pub fn token_usage(&self) -> TokenUsage {
        self.llm.token_usage()
    }

    /// 创建任务并将其对话重置为空
    pub async fn create_task(&self, request: TaskRequest) -> Result<Task, AgentError> {
        let task = self.db.create_task(&request).await?;
        self.sessions.begin(&task.task_id).await;
        tracing::info!(
            "📦 Task created: {} input: {}",
            task.task_id,
            input_preview(&task.input, INPUT_PREVIEW_CHARS)
        );
        Ok(task)
    }

    /// 释放任务的对话缓冲区（任务完成后由调用方决定何时释放）
    pub async fn end_task(&self, task_id: &str) {
        self.sessions.end(task_id).await;
    }

    /// 当前对话快照
    pub async fn conversation(&self, task_id: &str) -> Vec<Message> {
        self.sessions
            .snapshot(task_id)
            .await
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    fn render_seed(&self, task: &Task) -> Result<(String, String), AgentError> {
        let system_prompt = self
            .prompts
            .load_prompt(&self.settings.system_template, &[])?;
        let abilities = self.abilities.list_abilities_for_prompt();
        let task_prompt = self.prompts.load_prompt(
            &self.settings.task_template,
            &[("task", task.input.as_str()), ("abilities", abilities.as_str())],
        )?;
        Ok((system_prompt, task_prompt))
    }

    /// 请求模型并解析为非空 JSON 对象；失败时返回降级原因
    async fn request_answer(&self, messages: &[Message]) -> Result<Map<String, Value>, String> {
        let content = self
            .llm
            .complete_json(&self.settings.model, messages)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Unable to generate chat response");
                format!("Unable to generate chat response: {e}")
            })?;

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            tracing::error!(response = %content, error = %e, "Unable to decode chat response");
            format!("Unable to decode chat response: {e}")
        })?;
        tracing::debug!(answer = %value, "answer");

        truthy_object(value).ok_or_else(|| "Chat completion did not return a valid answer.".to_string())
    }

    /// 推进任务一步
    pub async fn execute_step(
        &self,
        task_id: &str,
        request: StepRequest,
    ) -> Result<StepOutcome, AgentError> {
        let task = self.db.get_task(task_id).await?;
        let mut step = self.db.create_step(task_id, &request, false).await?;

        let threshold = self.settings.seed_threshold;
        let messages = self
            .sessions
            .with_session(task_id, |conv| -> Result<Vec<Message>, AgentError> {
                if conv.len() < threshold {
                    let (system_prompt, task_prompt) = self.render_seed(&task)?;
                    conv.seed(system_prompt, task_prompt);
                }
                Ok(conv.messages().to_vec())
            })
            .await?;

        tracing::debug!(
            messages = %serde_json::to_string_pretty(&messages).unwrap_or_default(),
            "Sending the following messages to the model"
        );

        let mut answer = match self.request_answer(&messages).await {
            Ok(answer) => answer,
            Err(reason) => {
                tracing::error!(task_id = %task_id, step_id = %step.step_id, "Chat completion did not return a valid answer.");
                return Ok(StepOutcome::Degraded { step, reason });
            }
        };

        if let Some(directive) = AbilityDirective::from_answer(&answer) {
            let output = self
                .abilities
                .run_ability(task_id, &directive.name, directive.args)
                .await?;
            if directive.name == FINISH_ABILITY {
                step.is_last = true;
                step.status = StepStatus::Completed;
            }
            answer.insert("output".to_string(), output.into_json());
        }

        let serialized = serde_json::to_string(&answer)?;
        step.output = Some(Value::Object(answer));
        let len = self
            .sessions
            .with_session(task_id, |conv| {
                conv.push(Message::assistant(serialized));
                conv.len()
            })
            .await;

        if len >= self.settings.max_messages {
            step.is_last = true;
        }

        self.db.update_step(&step).await?;
        Ok(StepOutcome::Advanced(step))
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, AgentError> {
        self.db.get_task(task_id).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, AgentError> {
        self.db.list_tasks().await
    }

    pub async fn get_step(&self, task_id: &str, step_id: &str) -> Result<Step, AgentError> {
        self.db.get_step(task_id, step_id).await
    }

    pub async fn list_steps(&self, task_id: &str) -> Result<Vec<Step>, AgentError> {
        self.db.list_steps(task_id).await
    }

    /// 上传产物：写入任务工作区后登记
    pub async fn create_artifact(
        &self,
        task_id: &str,
        file_name: &str,
        relative_path: &str,
        data: &[u8],
    ) -> Result<Artifact, AgentError> {
        self.db.get_task(task_id).await?;
        let dir = relative_path.trim_end_matches('/');
        let path = if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{dir}/{file_name}")
        };
        self.workspace.write(task_id, &path, data)?;
        self.db
            .create_artifact(task_id, file_name, relative_path, false)
            .await
    }

    /// 读取产物内容
    pub async fn get_artifact(
        &self,
        task_id: &str,
        artifact_id: &str,
    ) -> Result<(Artifact, Vec<u8>), AgentError> {
        let artifact = self.db.get_artifact(task_id, artifact_id).await?;
        let data = self.workspace.read(task_id, &artifact.workspace_path())?;
        Ok((artifact, data))
    }

    pub async fn list_artifacts(&self, task_id: &str) -> Result<Vec<Artifact>, AgentError> {
        self.db.list_artifacts(task_id).await
    }
}

/// 按配置创建 Agent：工作区、存储（SQLite 或内存）、内置能力、LLM、模板
pub async fn create_agent(cfg: &AppConfig) -> Result<Agent, AgentError> {
    let workspace: Arc<dyn Workspace> = Arc::new(LocalWorkspace::new(&cfg.app.workspace_root)?);
    let db = create_db(cfg).await?;
    let abilities = builtin_registry(&cfg.abilities, workspace.clone());
    let llm = create_llm_from_config(&cfg.llm);
    let prompts = PromptEngine::new(cfg.llm.model.clone(), cfg.agent.prompts_dir.clone());
    Ok(Agent::new(
        db,
        workspace,
        abilities,
        llm,
        prompts,
        LoopSettings::from_config(cfg),
    ))
}

async fn create_db(cfg: &AppConfig) -> Result<Arc<dyn AgentDb>, AgentError> {
    #[cfg(feature = "async-sqlite")]
    if let Some(path) = &cfg.store.sqlite_path {
        tracing::info!("Using SQLite task store: {:?}", path);
        let db: Arc<dyn AgentDb> = Arc::new(crate::db::SqliteDb::new(path).await?);
        return Ok(db);
    }

    #[cfg(not(feature = "async-sqlite"))]
    if cfg.store.sqlite_path.is_some() {
        tracing::warn!("SQLite store requested but async-sqlite feature not enabled, using memory store");
    }

    tracing::info!("Using in-memory task store");
    let db: Arc<dyn AgentDb> = Arc::new(InMemoryDb::new());
    Ok(db)
}
