//! Scripted LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预置的回复，并记录每次收到的请求，便于断言 Transcript 与工具目录。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatRequest, ChatResponse, LlmClient, LlmError};
use crate::memory::ToolCall;

/// 预置回复
#[derive(Debug)]
pub enum ScriptedReply {
    Respond(ChatResponse),
    Fail(String),
    /// 永不返回，用于测试中断
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
        self
    }

    pub fn reply_text(&self, content: &str) -> &Self {
        self.push(ScriptedReply::Respond(ChatResponse::text(content)))
    }

    /// 空白回复（无内容、无 ToolCall）
    pub fn reply_blank(&self) -> &Self {
        self.push(ScriptedReply::Respond(ChatResponse {
            content: Some("   ".to_string()),
            tool_calls: Vec::new(),
        }))
    }

    /// 单个 ToolCall 的回复，arguments 原样透传
    pub fn reply_tool_call(&self, id: &str, name: &str, arguments: &str) -> &Self {
        self.push(ScriptedReply::Respond(ChatResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }))
    }

    pub fn fail(&self, error: &str) -> &Self {
        self.push(ScriptedReply::Fail(error.to_string()))
    }

    pub fn hang(&self) -> &Self {
        self.push(ScriptedReply::Hang)
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request);
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(ScriptedReply::Respond(resp)) => Ok(resp),
            Some(ScriptedReply::Fail(e)) => Err(LlmError::Request(e)),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(LlmError::Exhausted),
        }
    }
}
