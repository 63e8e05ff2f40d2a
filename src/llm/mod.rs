//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Scripted）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{ScriptedLlmClient, ScriptedReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{ChatRequest, ChatResponse, LlmClient, LlmError, ToolSpec};
