//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;

pub use mock::{MockLlmClient, RecordedRequest};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, TokenUsage};

/// 按 [llm].provider 创建客户端；未知 provider 回退到 openai 兼容端点
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.as_str() {
        "mock" => {
            tracing::info!("LLM provider: mock");
            Arc::new(MockLlmClient::new())
        }
        other => {
            if other != "openai" {
                tracing::warn!(provider = %other, "unknown LLM provider, using openai-compatible client");
            }
            Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                cfg.api_key.as_deref(),
            ))
        }
    }
}
