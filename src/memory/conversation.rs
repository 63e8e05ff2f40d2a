//! 短期记忆：对话 Transcript
//!
//! 以一条 system 消息开始，只在尾部追加或弹出；外部 reset 命令把它恢复为仅含 system 消息。
//! tool 消息必须引用紧邻的前一条 assistant 消息中的某个 ToolCall。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发出的工具调用；arguments 是原始 JSON 字符串，需防御式解析
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    /// 仅 assistant 消息使用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// 仅 tool 消息使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// 模型原样返回的 assistant 消息（content 可为空，可带 ToolCall）
    pub fn assistant_with_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// 去掉空白后无内容且没有 ToolCall
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// 对话 Transcript：按插入顺序保存，只在尾部变更
#[derive(Clone, Debug)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// 追加 tool 结果；tool_call_id 必须出现在紧邻的 assistant 消息中（中间只允许同批次的 tool 消息）
    pub fn push_tool_result(
        &mut self,
        tool_call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), String> {
        let owner = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role != Role::Tool)
            .filter(|m| m.role == Role::Assistant);
        match owner {
            Some(m) if m.tool_calls.iter().any(|c| c.id == tool_call_id) => {
                self.messages.push(Message::tool(tool_call_id, content));
                Ok(())
            }
            _ => Err(format!(
                "tool_call_id '{}' does not match the preceding assistant message",
                tool_call_id
            )),
        }
    }

    /// 仅当最后一条是 assistant 消息时移除并返回它
    pub fn pop_trailing_assistant(&mut self) -> Option<Message> {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => self.messages.pop(),
            _ => None,
        }
    }

    /// 恢复为只含原 system 消息
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近一条 user 消息的内容
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
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

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn test_tool_result_requires_matching_call() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("hi"));
        t.push(Message::assistant_with_calls(
            None,
            vec![call("a", "get_repo_info"), call("b", "list_repo_branches")],
        ));
        assert!(t.push_tool_result("a", "ok").is_ok());
        assert!(t.push_tool_result("b", "ok").is_ok());
        assert!(t.push_tool_result("zzz", "ok").is_err());
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn test_tool_result_rejected_after_user_message() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("hi"));
        assert!(t.push_tool_result("a", "ok").is_err());
    }

    #[test]
    fn test_pop_only_trailing_assistant() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("hi"));
        assert!(t.pop_trailing_assistant().is_none());
        t.push(Message::assistant_with_calls(Some("  ".into()), vec![]));
        assert!(t.pop_trailing_assistant().is_some());
        assert_eq!(t.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn test_reset_keeps_system_message() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("hi"));
        t.push(Message::assistant("hello"));
        t.reset();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].role, Role::System);
        assert_eq!(t.messages()[0].text(), "sys");
    }
}
