//! 能力注册表
//!
//! 所有能力实现 Ability trait（name / description / parameters / execute），由 AbilityRegistry 按名注册。
//! run_ability 在调用前按声明的参数 schema 校验：未知能力、缺必填、类型不符、未声明参数一律拒绝，
//! 缺省的可选参数用默认值补齐；每次调用输出结构化审计日志（JSON）。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::workspace::Workspace;

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Object => value.is_object(),
            ParameterType::Array => value.is_array(),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 参数声明
#[derive(Debug, Clone)]
pub struct AbilityParameter {
    pub name: String,
    pub description: String,
    pub kind: ParameterType,
    pub required: bool,
    pub default: Option<Value>,
}

impl AbilityParameter {
    pub fn required(name: &str, kind: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, kind: ParameterType, description: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            default: Some(default),
        }
    }
}

/// 能力执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum AbilityOutput {
    Text(String),
    /// 原始字节（如文件内容），序列化进对话前解码为文本
    Bytes(Vec<u8>),
    Json(Value),
}

impl AbilityOutput {
    /// 转为可写入回复的 JSON 值；字节按 UTF-8 解码
    pub fn into_json(self) -> Value {
        match self {
            AbilityOutput::Text(s) => Value::String(s),
            AbilityOutput::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
            AbilityOutput::Json(v) => v,
        }
    }
}

/// 能力执行上下文：调用所属任务与其工作区
#[derive(Clone)]
pub struct AbilityContext {
    pub task_id: String,
    pub workspace: Arc<dyn Workspace>,
}

/// 能力 trait：名称、描述（供 LLM 理解）、参数声明、异步执行（参数已校验）
#[async_trait]
pub trait Ability: Send + Sync {
    /// 能力名称（用于回复 JSON 中 ability.name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<AbilityParameter> {
        Vec::new()
    }

    /// 返回值类型，写入能力清单供模型参考
    fn output_type(&self) -> &str {
        "string"
    }

    async fn execute(
        &self,
        ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError>;
}

/// 能力注册表：按名称存储 Arc<dyn Ability>，持有工作区以构造执行上下文
pub struct AbilityRegistry {
    abilities: BTreeMap<String, Arc<dyn Ability>>,
    workspace: Arc<dyn Workspace>,
}

impl AbilityRegistry {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            abilities: BTreeMap::new(),
            workspace,
        }
    }

    pub fn register(&mut self, ability: impl Ability + 'static) {
        let name = ability.name().to_string();
        self.abilities.insert(name, Arc::new(ability));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Ability>> {
        self.abilities.get(name).cloned()
    }

    /// 供 prompt 使用的能力清单：每行 `- name(param: type, ...) -> output_type: description`，按名称排序
    pub fn list_abilities_for_prompt(&self) -> String {
        self.abilities
            .values()
            .map(|a| {
                let params: Vec<String> = a
                    .parameters()
                    .iter()
                    .map(|p| match &p.default {
                        Some(d) if !p.required => format!("{}: {} = {}", p.name, p.kind, d),
                        _ => format!("{}: {}", p.name, p.kind),
                    })
                    .collect();
                format!(
                    "- {}({}) -> {}: {}",
                    a.name(),
                    params.join(", "),
                    a.output_type(),
                    a.description()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 校验并执行能力；未知名或参数不符在执行前返回错误，能力内部错误原样传播
    pub async fn run_ability(
        &self,
        task_id: &str,
        name: &str,
        args: Value,
    ) -> Result<AbilityOutput, AgentError> {
        let ability = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownAbility(name.to_string()))?;
        let args_preview = args_preview(&args);
        let args = validate_args(ability.as_ref(), args)?;
        let ctx = AbilityContext {
            task_id: task_id.to_string(),
            workspace: self.workspace.clone(),
        };

        let start = Instant::now();
        let result = ability.execute(&ctx, args).await;
        let audit = serde_json::json!({
            "event": "ability_audit",
            "ability": name,
            "task_id": task_id,
            "ok": result.is_ok(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "ability");
        result
    }
}

/// 按参数声明校验 args，返回补齐默认值后的参数表
pub fn validate_args(ability: &dyn Ability, args: Value) -> Result<Map<String, Value>, AgentError> {
    let name = ability.name();
    let mut args = match args {
        Value::Object(map) => map,
        other => {
            return Err(AgentError::invalid_args(
                name,
                format!("arguments must be an object, got {other}"),
            ))
        }
    };
    let params = ability.parameters();

    if let Some(unknown) = args
        .keys()
        .find(|k| !params.iter().any(|p| &p.name == *k))
    {
        return Err(AgentError::invalid_args(
            name,
            format!("unexpected parameter '{unknown}'"),
        ));
    }

    for p in &params {
        match args.get(&p.name) {
            Some(v) if !p.kind.matches(v) => {
                return Err(AgentError::invalid_args(
                    name,
                    format!("parameter '{}' must be {}, got {}", p.name, p.kind, v),
                ));
            }
            Some(_) => {}
            None if p.required => {
                return Err(AgentError::invalid_args(
                    name,
                    format!("missing required parameter '{}'", p.name),
                ));
            }
            None => {
                if let Some(d) = &p.default {
                    args.insert(p.name.clone(), d.clone());
                }
            }
        }
    }
    Ok(args)
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

/// 取已校验的字符串参数
pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::LocalWorkspace;
    use serde_json::json;

    struct Greet;

    #[async_trait]
    impl Ability for Greet {
        fn name(&self) -> &str {
            "greet"
        }

        fn description(&self) -> &str {
            "Greet someone"
        }

        fn parameters(&self) -> Vec<AbilityParameter> {
            vec![
                AbilityParameter::required("who", ParameterType::String, "Name"),
                AbilityParameter::optional("loud", ParameterType::Boolean, "Shout", json!(false)),
            ]
        }

        async fn execute(
            &self,
            _ctx: &AbilityContext,
            args: Map<String, Value>,
        ) -> Result<AbilityOutput, AgentError> {
            let who = str_arg(&args, "who");
            let loud = args.get("loud").and_then(|v| v.as_bool()).unwrap_or(false);
            let text = format!("hello {who}");
            Ok(AbilityOutput::Text(if loud { text.to_uppercase() } else { text }))
        }
    }

    fn registry() -> (tempfile::TempDir, AbilityRegistry) {
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Arc::new(LocalWorkspace::new(dir.path()).unwrap());
        let mut reg = AbilityRegistry::new(ws);
        reg.register(Greet);
        (dir, reg)
    }

    #[tokio::test]
    async fn test_run_fills_defaults() {
        let (_dir, reg) = registry();
        let out = reg.run_ability("t", "greet", json!({"who": "bob"})).await.unwrap();
        assert_eq!(out, AbilityOutput::Text("hello bob".into()));
        let out = reg
            .run_ability("t", "greet", json!({"who": "bob", "loud": true}))
            .await
            .unwrap();
        assert_eq!(out, AbilityOutput::Text("HELLO BOB".into()));
    }

    #[tokio::test]
    async fn test_unknown_ability_rejected() {
        let (_dir, reg) = registry();
        let err = reg.run_ability("t", "nope", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownAbility(n) if n == "nope"));
    }

    #[tokio::test]
    async fn test_schema_mismatch_rejected() {
        let (_dir, reg) = registry();
        for bad in [
            json!({}),
            json!({"who": 3}),
            json!({"who": "a", "extra": 1}),
            json!({"who": "a", "loud": "yes"}),
            json!(["who"]),
        ] {
            let err = reg.run_ability("t", "greet", bad.clone()).await.unwrap_err();
            assert!(
                matches!(err, AgentError::InvalidArguments { .. }),
                "{bad} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_prompt_listing() {
        let (_dir, reg) = registry();
        assert_eq!(
            reg.list_abilities_for_prompt(),
            "- greet(who: string, loud: boolean = false) -> string: Greet someone"
        );
    }

    #[test]
    fn test_bytes_output_decodes_to_text() {
        let out = AbilityOutput::Bytes(b"caf\xc3\xa9".to_vec());
        assert_eq!(out.into_json(), json!("café"));
    }

    #[test]
    fn test_integer_type_rejects_float() {
        assert!(ParameterType::Integer.matches(&json!(3)));
        assert!(!ParameterType::Integer.matches(&json!(3.5)));
        assert!(ParameterType::Number.matches(&json!(3.5)));
    }
}
