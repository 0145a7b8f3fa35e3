//! 任务会话存储
//!
//! 每个任务一份对话缓冲区，按 task_id 查找；begin 时重置为空，任务结束后可移除。
//! 同一任务的步骤串行执行，不同任务互不影响。

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::memory::Conversation;

/// 按 task_id 管理对话缓冲区
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Conversation>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为任务创建（或覆盖为）空对话
    pub async fn begin(&self, task_id: &str) {
        self.sessions
            .write()
            .await
            .insert(task_id.to_string(), Conversation::new());
    }

    /// 在会话上执行闭包；会话不存在时先创建空会话（如进程重启后继续已有任务）
    pub async fn with_session<F, R>(&self, task_id: &str, f: F) -> R
    where
        F: FnOnce(&mut Conversation) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let conv = sessions.entry(task_id.to_string()).or_default();
        f(conv)
    }

    /// 当前对话快照
    pub async fn snapshot(&self, task_id: &str) -> Option<Conversation> {
        self.sessions.read().await.get(task_id).cloned()
    }

    /// 任务结束后释放对话
    pub async fn end(&self, task_id: &str) -> Option<Conversation> {
        self.sessions.write().await.remove(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_sessions_are_isolated_per_task() {
        let store = SessionStore::new();
        store.begin("a").await;
        store.begin("b").await;
        store
            .with_session("a", |c| c.push(Message::assistant("only in a")))
            .await;

        assert_eq!(store.snapshot("a").await.map(|c| c.len()).unwrap_or(0), 1);
        assert_eq!(store.snapshot("b").await.map(|c| c.len()).unwrap_or(0), 0);
        assert!(store.snapshot("b").await.is_some());
    }

    #[tokio::test]
    async fn test_begin_resets_existing_conversation() {
        let store = SessionStore::new();
        store.with_session("t", |c| c.seed("sys", "task")).await;
        assert_eq!(store.snapshot("t").await.map(|c| c.len()).unwrap_or(0), 2);

        store.begin("t").await;
        assert_eq!(store.snapshot("t").await.map(|c| c.len()).unwrap_or(0), 0);
        assert!(store.snapshot("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_removes_session() {
        let store = SessionStore::new();
        store.begin("t").await;
        assert!(store.end("t").await.is_some());
        assert!(store.snapshot("t").await.is_none());
    }
}
