//! 空回复恢复
//!
//! 模型返回空白内容且没有 ToolCall 时：弹出该 assistant 消息，追加一条带标记的恢复提示
//! （刚执行过的工具 + 原始请求），再让模型重答。次数按用户轮计数，每轮开始时清零。

use crate::memory::{Message, Role, Transcript};

/// 恢复提示的前缀，查找原始请求时跳过以它开头的 user 消息
pub const RECOVERY_MARKER: &str = "[Empty response recovery]";

/// 扫描最近多少条消息来收集工具名
const TOOL_SCAN_WINDOW: usize = 5;

/// 原始请求的截断长度（字符）
const REQUEST_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Default)]
pub struct RecoveryController {
    attempts: usize,
}

impl RecoveryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新的用户轮开始
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn can_retry(&self, max_attempts: usize) -> bool {
        self.attempts < max_attempts
    }

    /// 移除空的 assistant 消息并追加恢复提示
    pub fn recover(&mut self, transcript: &mut Transcript) {
        transcript.pop_trailing_assistant();
        let prompt = build_recovery_prompt(transcript.messages());
        transcript.push(Message::user(prompt));
        self.attempts += 1;
        tracing::warn!(attempt = self.attempts, "Empty model response, retrying with recovery prompt");
    }
}

/// 最近几条 assistant 消息里调用过的工具（去重，保持首次出现顺序）
fn recent_tool_names(messages: &[Message]) -> Vec<String> {
    let start = messages.len().saturating_sub(TOOL_SCAN_WINDOW);
    let mut names: Vec<String> = Vec::new();
    for m in &messages[start..] {
        if m.role != Role::Assistant {
            continue;
        }
        for call in &m.tool_calls {
            if !names.contains(&call.name) {
                names.push(call.name.clone());
            }
        }
    }
    names
}

/// 最近一条真正来自用户的请求（跳过恢复提示）
fn original_request(messages: &[Message]) -> Option<String> {
    let text = messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .map(|m| m.text())
        .find(|t| !t.starts_with(RECOVERY_MARKER))?;
    if text.chars().count() > REQUEST_PREVIEW_CHARS {
        let head: String = text.chars().take(REQUEST_PREVIEW_CHARS).collect();
        Some(format!("{}...", head))
    } else {
        Some(text.to_string())
    }
}

pub fn build_recovery_prompt(messages: &[Message]) -> String {
    let tools = recent_tool_names(messages);
    let tools_line = if tools.is_empty() {
        "No tools were run for this request.".to_string()
    } else {
        format!("You just ran these tools: {}.", tools.join(", "))
    };
    let request_line = match original_request(messages) {
        Some(req) => format!("The original request was: \"{}\".", req),
        None => "The original request is not available.".to_string(),
    };
    format!(
        "{} Your previous reply was empty. {} {} \
         Please provide a substantive reply to the request using the information you have, \
         or ask a clarifying question if something is missing.",
        RECOVERY_MARKER, tools_line, request_line
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCall;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{}", name),
            name: name.into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn test_recover_pops_blank_assistant_and_appends_prompt() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("show me the README of octo/demo"));
        t.push(Message::assistant_with_calls(None, vec![call("get_file_content")]));
        t.push_tool_result("call_get_file_content", "# demo").unwrap();
        t.push(Message::assistant_with_calls(Some("  ".into()), Vec::new()));

        let mut rc = RecoveryController::new();
        rc.recover(&mut t);

        assert_eq!(rc.attempts(), 1);
        assert_eq!(t.len(), 5);
        let last = t.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.text().starts_with(RECOVERY_MARKER));
        assert!(last.text().contains("get_file_content"));
        assert!(last.text().contains("show me the README of octo/demo"));
    }

    #[test]
    fn test_prompt_skips_marker_messages_and_truncates() {
        let long = "x".repeat(150);
        let mut t = Transcript::new("sys");
        t.push(Message::user(long));
        t.push(Message::user(format!("{} earlier retry", RECOVERY_MARKER)));
        let prompt = build_recovery_prompt(t.messages());
        assert!(prompt.contains(&format!("\"{}...\"", "x".repeat(100))));
        assert!(prompt.contains("No tools were run"));
    }

    #[test]
    fn test_pop_only_removes_assistant_tail() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("hi"));
        let mut rc = RecoveryController::new();
        rc.recover(&mut t);
        assert_eq!(t.messages()[1].text(), "hi");
        assert_eq!(t.len(), 3);
        assert!(rc.can_retry(2));
        rc.recover(&mut t);
        assert!(!rc.can_retry(2));
        rc.reset();
        assert!(rc.can_retry(2));
    }

    #[test]
    fn test_tool_names_are_distinct_and_windowed() {
        let mut t = Transcript::new("sys");
        t.push(Message::user("q"));
        t.push(Message::assistant_with_calls(None, vec![call("old_tool")]));
        t.push_tool_result("call_old_tool", "r").unwrap();
        t.push(Message::assistant_with_calls(None, vec![call("a"), call("b")]));
        t.push_tool_result("call_a", "r").unwrap();
        t.push_tool_result("call_b", "r").unwrap();
        t.push(Message::assistant_with_calls(None, vec![call("a")]));
        t.push_tool_result("call_a", "r").unwrap();
        assert_eq!(recent_tool_names(t.messages()), vec!["a".to_string(), "b".to_string()]);
    }
}
