//! Agent 错误类型
//!
//! 会话层只向调用方抛出 AgentError：LLM 失败、用户取消、配置问题、Transcript 不变式被破坏。
//! 工具层错误（参数 / 未知工具 / 执行失败）不会出现在这里，它们已被转换成工具结果文本。

use thiserror::Error;

use crate::github::GitHubError;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// 用户中断（Ctrl+C），当前轮已追加的消息保留
    #[error("Request interrupted by user")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    /// tool 消息的 tool_call_id 与前一条 assistant 消息不匹配
    #[error("Transcript invariant violated: {0}")]
    Transcript(String),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
