//! 记忆层：任务内对话缓冲区

pub mod conversation;

pub use conversation::{Conversation, Message, Role};
