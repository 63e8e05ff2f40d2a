//! 记忆层：单会话的对话 Transcript（不跨进程持久化）

pub mod conversation;

pub use conversation::{Message, Role, ToolCall, Transcript};
