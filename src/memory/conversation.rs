//! 对话缓冲区
//!
//! 每个任务一份，按顺序保存 system / user / assistant 消息，整体发送给 LLM。
//! 只追加不删除：前两条（若存在）为 system prompt 与任务 prompt，之后每步追加一条 assistant 回复。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话缓冲区：无剪枝，生命周期与任务一致
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 system + user 两条消息重新播种（覆盖已有内容）
    pub fn seed(&mut self, system_prompt: impl Into<String>, task_prompt: impl Into<String>) {
        self.messages = vec![Message::system(system_prompt)];
        self.messages.push(Message::user(task_prompt));
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_replaces_existing() {
        let mut conv = Conversation::new();
        conv.push(Message::assistant("stale"));
        conv.seed("sys", "task");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0], Message::system("sys"));
        assert_eq!(conv.messages()[1], Message::user("task"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
