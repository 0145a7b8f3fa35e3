//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置回复；预置用尽后以最后一条 User 消息构造 finish 能力调用，便于本地跑通任务。
//! 每次请求的模型名与消息快照都会被记录，供测试断言；token 用量按空白分词粗略计数。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::memory::{Message, Role};

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

/// Mock 客户端：预置回复队列 + 请求记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    usage: Mutex<TokenUsage>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以固定回复序列创建
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn token_usage(&self) -> TokenUsage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }

    async fn complete_json(&self, model: &str, messages: &[Message]) -> Result<String, LlmError> {
        let reply = self.reply_for(model, messages);
        if let (Ok(text), Ok(mut usage)) = (&reply, self.usage.lock()) {
            usage.prompt_tokens += messages.iter().map(|m| word_count(&m.content)).sum::<u64>();
            usage.completion_tokens += word_count(text);
        }
        reply
    }
}

impl MockLlmClient {
    fn reply_for(&self, model: &str, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(RecordedRequest {
                model: model.to_string(),
                messages: messages.to_vec(),
            });
        }
        let scripted = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(reply) = scripted {
            return reply;
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(serde_json::json!({
            "thoughts": { "text": "mock", "reasoning": "no scripted reply left" },
            "ability": { "name": "finish", "args": { "reason": format!("Echo from Mock: {last_user}") } }
        })
        .to_string())
    }
}
