//! 模型回复格式的 JSON Schema（schemars 自动生成）
//!
//! 拼入 system prompt，约束 LLM 每步只输出一个 `{"thoughts": ..., "ability": {...}}` 对象。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 模型的思考过程（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct Thoughts {
    /// 当前想法
    text: String,
    /// 推理依据
    reasoning: String,
    /// 简短的后续计划
    plan: String,
    /// 自我批评
    criticism: String,
    /// 给用户的总结
    speak: String,
}

/// 能力调用指令（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct AbilityCallFormat {
    /// 能力名，如 fetch_webpage、finish
    name: String,
    /// 能力参数，键为参数名
    args: HashMap<String, Value>,
}

/// 每步回复格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct AnswerFormat {
    thoughts: Thoughts,
    ability: AbilityCallFormat,
}

/// 返回回复格式的 JSON Schema 字符串，可拼入 system prompt
pub fn answer_schema_json() -> String {
    let schema = schema_for!(AnswerFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names_ability_fields() {
        let schema = answer_schema_json();
        assert!(schema.contains("\"ability\""));
        assert!(schema.contains("\"args\""));
        assert!(schema.contains("\"thoughts\""));
    }
}
