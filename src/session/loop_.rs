//! 工具调用会话循环
//!
//! 状态：AwaitingModel → ExecutingTools → AwaitingModel（有界循环）；AwaitingModel → Done；
//! AwaitingModel → Recovering → AwaitingModel。
//!
//! 每次模型调用都携带完整 Transcript 与工具目录；ToolCall 按返回顺序逐个执行，结果在该调用完成后才追加。
//! 模型调用与工具调用都与 CancellationToken 竞争，取消时 Transcript 保留已完整追加的消息。

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{ChatRequest, LlmClient};
use crate::memory::{Message, Role, ToolCall, Transcript};
use crate::session::prompts::{MAIN_SYSTEM_PROMPT, REVIEWER_SYSTEM_PROMPT};
use crate::session::{PrReviewGate, RecoveryController, RECOVERY_MARKER};
use crate::tools::{ToolDispatcher, ToolScope};

/// 会话角色：主 Agent 或评审 Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProfile {
    Main,
    /// 更低温度、只读工具、不拦截 PR 工具
    Reviewer,
}

impl SessionProfile {
    fn system_prompt(&self) -> &'static str {
        match self {
            SessionProfile::Main => MAIN_SYSTEM_PROMPT,
            SessionProfile::Reviewer => REVIEWER_SYSTEM_PROMPT,
        }
    }

    fn scope(&self) -> ToolScope {
        match self {
            SessionProfile::Main => ToolScope::All,
            SessionProfile::Reviewer => ToolScope::ReadOnly,
        }
    }

    fn model(&self, cfg: &AppConfig) -> String {
        match self {
            SessionProfile::Main => cfg.llm.model.clone(),
            SessionProfile::Reviewer => cfg.review_model().to_string(),
        }
    }

    fn temperature(&self, cfg: &AppConfig) -> Option<f32> {
        match self {
            SessionProfile::Main => None,
            SessionProfile::Reviewer => Some(cfg.peer_review.temperature),
        }
    }
}

/// 一个用户轮的结束方式
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// 模型给出了非空回复
    Reply(String),
    /// 空回复且恢复次数用尽（或恢复被关闭）
    NoContent,
    /// 工具调用轮数达到上限
    RoundLimit(usize),
}

impl fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnOutcome::Reply(text) => f.write_str(text),
            TurnOutcome::NoContent => f.write_str("No response content received"),
            TurnOutcome::RoundLimit(n) => {
                write!(f, "Stopped after {} tool-call rounds without a final answer", n)
            }
        }
    }
}

pub struct ToolCallingSession {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    profile: SessionProfile,
    transcript: Transcript,
    recovery: RecoveryController,
    gate: Option<PrReviewGate>,
}

impl ToolCallingSession {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ToolDispatcher>,
        profile: SessionProfile,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            profile,
            transcript: Transcript::new(profile.system_prompt()),
            recovery: RecoveryController::new(),
            gate: None,
        }
    }

    /// 主会话：PR 提交经评审闸门
    pub fn main(llm: Arc<dyn LlmClient>, dispatcher: Arc<ToolDispatcher>, gate: PrReviewGate) -> Self {
        let mut session = Self::new(llm, dispatcher, SessionProfile::Main);
        session.gate = Some(gate);
        session
    }

    pub fn reviewer(llm: Arc<dyn LlmClient>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self::new(llm, dispatcher, SessionProfile::Reviewer)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn profile(&self) -> SessionProfile {
        self.profile
    }

    pub fn gate(&self) -> Option<&PrReviewGate> {
        self.gate.as_ref()
    }

    /// 外部 reset 命令：清空对话与进行中的评审上下文
    pub fn reset(&mut self) {
        self.transcript.reset();
        if let Some(gate) = self.gate.as_mut() {
            gate.clear();
        }
        tracing::info!("Conversation reset");
    }

    /// 提交一条用户输入，运行到本轮结束
    pub async fn submit(
        &mut self,
        cfg: &AppConfig,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        self.recovery.reset();
        self.transcript.push(Message::user(input));

        let catalog = self.dispatcher.catalog(self.profile.scope());
        let model = self.profile.model(cfg);
        let temperature = self.profile.temperature(cfg);
        let max_rounds = cfg.agent.max_tool_rounds.max(1);
        let mut rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let request = ChatRequest {
                model: model.clone(),
                messages: self.transcript.messages().to_vec(),
                tools: catalog.clone(),
                temperature,
            };
            tracing::debug!(
                profile = ?self.profile,
                messages = request.messages.len(),
                "Calling model"
            );
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = self.llm.chat(request) => r?,
            };

            let message = response.into_message();
            let calls = message.tool_calls.clone();
            let blank = message.is_blank();
            let text = message.text().to_string();
            self.transcript.push(message);

            if !calls.is_empty() {
                tracing::info!(calls = calls.len(), round = rounds + 1, "Executing tool calls");
                for call in &calls {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        r = self.execute_call(cfg, call, cancel) => r?,
                    };
                    self.transcript
                        .push_tool_result(&call.id, result)
                        .map_err(AgentError::Transcript)?;
                }
                rounds += 1;
                if rounds >= max_rounds {
                    tracing::warn!(rounds, "Tool-call round limit reached");
                    return Ok(TurnOutcome::RoundLimit(rounds));
                }
                continue;
            }

            if !blank {
                return Ok(TurnOutcome::Reply(text));
            }

            if cfg.agent.empty_response_recovery
                && self.recovery.can_retry(cfg.agent.max_recovery_attempts)
            {
                self.recovery.recover(&mut self.transcript);
                continue;
            }

            tracing::warn!(
                attempts = self.recovery.attempts(),
                "No response content received"
            );
            return Ok(TurnOutcome::NoContent);
        }
    }

    async fn execute_call(
        &mut self,
        cfg: &AppConfig,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        if let Some(gate) = self.gate.as_mut() {
            let user_request = self
                .transcript
                .messages()
                .iter()
                .rev()
                .filter(|m| m.role == Role::User)
                .map(|m| m.text())
                .find(|t| !t.starts_with(RECOVERY_MARKER))
                .map(String::from);
            if let Some(result) = gate
                .handle(cfg, &self.dispatcher, call, user_request, cancel)
                .await?
            {
                return Ok(result);
            }
        }
        Ok(self.dispatcher.dispatch(call, self.profile.scope()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, ScriptedLlmClient, ScriptedReply};
    use crate::tools::{LogProgress, StaticConfirmer, Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::Value;

    struct EchoRepoTool;

    #[async_trait]
    impl Tool for EchoRepoTool {
        fn name(&self) -> &str {
            "get_repo_info"
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn read_only(&self) -> bool {
            true
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok("{\"full_name\":\"octo/demo\"}".to_string())
        }
    }

    /// 执行时触发取消，然后一直挂起
    struct CancelOnRunTool(CancellationToken);

    #[async_trait]
    impl Tool for CancelOnRunTool {
        fn name(&self) -> &str {
            "list_branches"
        }

        fn description(&self) -> &str {
            "cancels"
        }

        fn read_only(&self) -> bool {
            true
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            self.0.cancel();
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn session(llm: Arc<ScriptedLlmClient>) -> ToolCallingSession {
        let mut registry = ToolRegistry::new();
        registry.register(EchoRepoTool);
        session_with(llm, registry)
    }

    fn session_with(llm: Arc<ScriptedLlmClient>, registry: ToolRegistry) -> ToolCallingSession {
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            Arc::new(StaticConfirmer::new(true)),
            Arc::new(LogProgress),
        ));
        ToolCallingSession::new(llm, dispatcher, SessionProfile::Main)
    }

    #[tokio::test]
    async fn test_tool_round_then_reply() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.reply_tool_call("c1", "get_repo_info", r#"{"repo":"octo/demo"}"#)
            .reply_text("octo/demo is a demo repo");
        let mut s = session(llm.clone());
        let cancel = CancellationToken::new();
        let out = s.submit(&AppConfig::default(), "describe octo/demo", &cancel).await.unwrap();
        assert_eq!(out, TurnOutcome::Reply("octo/demo is a demo repo".into()));

        let roles: Vec<Role> = s.transcript().messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_blank_reply_recovers_once() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.reply_blank().reply_text("here you go");
        let mut s = session(llm.clone());
        let out = s
            .submit(&AppConfig::default(), "hello", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, TurnOutcome::Reply("here you go".into()));
        let second = &llm.requests()[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].text(), "hello");
        assert_eq!(second[2].role, Role::User);
        assert!(second[2].text().starts_with(RECOVERY_MARKER));
    }

    #[tokio::test]
    async fn test_recovery_exhausted_reports_no_content() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.reply_blank().reply_blank().reply_blank().reply_text("never reached");
        let mut s = session(llm.clone());
        let out = s
            .submit(&AppConfig::default(), "hello", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, TurnOutcome::NoContent);
        assert_eq!(llm.requests().len(), 3);
        assert_eq!(llm.remaining(), 1);
    }

    #[tokio::test]
    async fn test_recovery_disabled() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.reply_blank();
        let mut cfg = AppConfig::default();
        cfg.agent.empty_response_recovery = false;
        let mut s = session(llm.clone());
        let out = s.submit(&cfg, "hello", &CancellationToken::new()).await.unwrap();
        assert_eq!(out, TurnOutcome::NoContent);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_round_limit_stops_loop() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.reply_tool_call("c1", "get_repo_info", r#"{}"#)
            .reply_tool_call("c2", "get_repo_info", r#"{}"#)
            .reply_text("unused");
        let mut cfg = AppConfig::default();
        cfg.agent.max_tool_rounds = 2;
        let mut s = session(llm.clone());
        let out = s.submit(&cfg, "loop", &CancellationToken::new()).await.unwrap();
        assert_eq!(out, TurnOutcome::RoundLimit(2));
        assert_eq!(llm.remaining(), 1);
    }

    #[tokio::test]
    async fn test_cancel_keeps_appended_messages() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.hang();
        let mut s = session(llm.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = s.submit(&AppConfig::default(), "hello", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(s.transcript().len(), 2);

        s.reset();
        assert_eq!(s.transcript().len(), 1);
    }

    fn batch(calls: &[(&str, &str, &str)]) -> ScriptedReply {
        ScriptedReply::Respond(ChatResponse {
            content: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_bad_arguments_do_not_stop_the_batch() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push(batch(&[
            ("c1", "get_repo_info", "{not json"),
            ("c2", "get_repo_info", r#"{"repo":"octo/demo"}"#),
        ]))
        .reply_text("done");
        let mut s = session(llm.clone());
        let out = s
            .submit(&AppConfig::default(), "describe", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, TurnOutcome::Reply("done".into()));

        let tools: Vec<&Message> = s
            .transcript()
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].tool_call_id.as_deref(), Some("c1"));
        assert!(tools[0].text().starts_with("Error parsing tool arguments"));
        assert_eq!(tools[1].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(tools[1].text(), "{\"full_name\":\"octo/demo\"}");
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_keeps_finished_results() {
        let cancel = CancellationToken::new();
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push(batch(&[
            ("c1", "get_repo_info", r#"{"repo":"octo/demo"}"#),
            ("c2", "list_branches", r#"{"repo":"octo/demo"}"#),
        ]))
        .reply_text("unused");

        let mut registry = ToolRegistry::new();
        registry.register(EchoRepoTool);
        registry.register(CancelOnRunTool(cancel.clone()));
        let mut s = session_with(llm.clone(), registry);

        let err = s
            .submit(&AppConfig::default(), "describe", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        let roles: Vec<Role> = s.transcript().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(s.transcript().messages()[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(llm.remaining(), 1);
    }
}
