//! finish：终止能力，调用即表示任务完成

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::abilities::registry::str_arg;
use crate::abilities::{Ability, AbilityContext, AbilityOutput, AbilityParameter, ParameterType};
use crate::core::AgentError;

/// 控制循环据此名判定任务完成
pub const FINISH_ABILITY: &str = "finish";

pub struct FinishAbility;

#[async_trait]
impl Ability for FinishAbility {
    fn name(&self) -> &str {
        FINISH_ABILITY
    }

    fn description(&self) -> &str {
        "Use this to shut down once you have accomplished all of your goals, or when there are insurmountable problems that make it impossible for you to finish your task."
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![AbilityParameter::required(
            "reason",
            ParameterType::String,
            "A summary to the user of how the goals were accomplished",
        )]
    }

    async fn execute(
        &self,
        ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let reason = str_arg(&args, "reason");
        tracing::info!(task_id = %ctx.task_id, reason = %reason, "task finished");
        Ok(AbilityOutput::Text(reason.to_string()))
    }
}
