//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：以指定模型发送完整对话，要求 JSON 输出，返回首条回复文本。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request build failed: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("response has no choices")]
    EmptyResponse,
}

/// 累计 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// LLM 客户端 trait：单次非流式 chat completion
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 以 JSON 输出模式请求 `model`，返回 choices[0].message.content
    async fn complete_json(&self, model: &str, messages: &[Message]) -> Result<String, LlmError>;

    /// 自创建以来的累计用量；不统计用量的后端返回全 0
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}
