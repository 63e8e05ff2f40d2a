//! 评审 Agent：每次评审新建一个评审会话（只读工具、低温度），把最终回复解析为 ReviewVerdict

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};
use crate::review::{parse_verdict, PeerReviewContext, ReviewVerdict};
use crate::session::{ToolCallingSession, TurnOutcome};
use crate::tools::ToolDispatcher;

/// 评审调用本身失败（不是解析失败，解析失败总会回退到启发式）
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("reviewer model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("reviewer returned no content")]
    EmptyResponse,

    #[error("reviewer stopped after {0} tool-call rounds without a verdict")]
    RoundLimit(usize),

    #[error("review interrupted by user")]
    Cancelled,

    #[error("reviewer session failed: {0}")]
    Session(String),
}

/// 给出一次评审结论
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        cfg: &AppConfig,
        ctx: &PeerReviewContext,
        cancel: &CancellationToken,
    ) -> Result<ReviewVerdict, ReviewError>;
}

pub struct PeerReviewAgent {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
}

impl PeerReviewAgent {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { llm, dispatcher }
    }
}

#[async_trait]
impl Reviewer for PeerReviewAgent {
    async fn review(
        &self,
        cfg: &AppConfig,
        ctx: &PeerReviewContext,
        cancel: &CancellationToken,
    ) -> Result<ReviewVerdict, ReviewError> {
        tracing::info!(
            repo = %ctx.draft.repo,
            title = %ctx.draft.title,
            iteration = ctx.current_iteration + 1,
            model = %cfg.review_model(),
            "Starting peer review"
        );
        let mut session = ToolCallingSession::reviewer(self.llm.clone(), self.dispatcher.clone());
        let request = format_review_request(ctx);
        match session.submit(cfg, &request, cancel).await {
            Ok(TurnOutcome::Reply(text)) => Ok(parse_verdict(&text)),
            Ok(TurnOutcome::NoContent) => Err(ReviewError::EmptyResponse),
            Ok(TurnOutcome::RoundLimit(n)) => Err(ReviewError::RoundLimit(n)),
            Err(AgentError::Cancelled) => Err(ReviewError::Cancelled),
            Err(AgentError::Llm(e)) => Err(ReviewError::Llm(e)),
            Err(e) => Err(ReviewError::Session(e.to_string())),
        }
    }
}

/// 评审请求正文
pub fn format_review_request(ctx: &PeerReviewContext) -> String {
    let d = &ctx.draft;
    let files: Vec<String> = d
        .files
        .iter()
        .map(|f| format!("**File: {}**\n```\n{}\n```", f.file_path, f.new_content))
        .collect();

    format!(
        "Please review this pull request before submission to GitHub. \
         You can use read-only GitHub tools to explore repository context.\n\n\
         **Repository:** {repo}\n\
         **PR Title:** {title}\n\
         **PR Description:** {body}\n\
         **Branch:** {branch} → {base}\n\
         **Commit Message:** {commit}\n\n\
         **Original User Request Context:**\n{request}\n\n\
         **Files Changed:**\n{files}\n\n\
         **Review History:**\n{history}\n\n\
         **Instructions:**\n\
         1. Use available GitHub tools to explore repository context if needed\n\
         2. Consider how these changes fit with the existing codebase\n\
         3. Evaluate code quality, security, and best practices\n\
         4. Provide specific, actionable feedback\n\n\
         Please provide your review in the following JSON format:\n\
         {{\n\
         \x20   \"decision\": \"approve|request_changes|needs_major_revision\",\n\
         \x20   \"feedback\": \"Overall assessment and key points\",\n\
         \x20   \"suggestions\": [\"Specific suggestion 1\", \"Specific suggestion 2\"],\n\
         \x20   \"reasoning\": \"Explanation of your decision and any tool usage\"\n\
         }}",
        repo = d.repo,
        title = d.title,
        body = d.body,
        branch = d.branch_name,
        base = d.base_branch.as_deref().unwrap_or("main"),
        commit = d.commit_message,
        request = ctx
            .user_request
            .as_deref()
            .unwrap_or("No original request context provided"),
        files = files.join("\n\n"),
        history = format_review_history(ctx),
    )
}

fn format_review_history(ctx: &PeerReviewContext) -> String {
    if ctx.review_history.is_empty() {
        return "This is the first review iteration.".to_string();
    }
    ctx.review_history
        .iter()
        .map(|r| format!("- Iteration {}: {} - {}", r.iteration, r.decision, r.feedback))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::review::{Decision, FileChange, PullRequestDraft, VerdictSource};
    use crate::tools::{LogProgress, StaticConfirmer, ToolRegistry};

    fn ctx() -> PeerReviewContext {
        PeerReviewContext::new(
            PullRequestDraft {
                repo: "octo/demo".into(),
                title: "Add retry".into(),
                body: "Retries failed calls".into(),
                files: vec![FileChange {
                    file_path: "src/retry.rs".into(),
                    new_content: "pub fn retry() {}".into(),
                }],
                commit_message: "Add retry helper".into(),
                branch_name: "feature/retry".into(),
                base_branch: None,
            },
            Some("please add retries".into()),
        )
    }

    fn agent(llm: Arc<ScriptedLlmClient>) -> PeerReviewAgent {
        let dispatcher = Arc::new(ToolDispatcher::new(
            ToolRegistry::new(),
            Arc::new(StaticConfirmer::new(false)),
            Arc::new(LogProgress),
        ));
        PeerReviewAgent::new(llm, dispatcher)
    }

    #[test]
    fn test_review_request_contents() {
        let mut c = ctx();
        let text = format_review_request(&c);
        assert!(text.contains("**Branch:** feature/retry → main"));
        assert!(text.contains("**File: src/retry.rs**\n```\npub fn retry() {}\n```"));
        assert!(text.contains("please add retries"));
        assert!(text.contains("This is the first review iteration."));

        c.record(&ReviewVerdict {
            decision: Decision::RequestChanges,
            feedback: "Add backoff".into(),
            suggestions: vec![],
            reasoning: None,
            source: VerdictSource::Parsed,
        });
        let text = format_review_request(&c);
        assert!(text.contains("- Iteration 1: request_changes - Add backoff"));
    }

    #[tokio::test]
    async fn test_reviewer_uses_low_temperature_and_read_only_catalog() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.reply_text(r#"{"decision": "approve", "feedback": "LGTM", "suggestions": []}"#);
        let mut cfg = AppConfig::default();
        cfg.peer_review.model = Some("review-model".into());
        let verdict = agent(llm.clone())
            .review(&cfg, &ctx(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(verdict.decision, Decision::Approve);

        let req = &llm.requests()[0];
        assert_eq!(req.model, "review-model");
        assert_eq!(req.temperature, Some(0.3));
        assert!(req.tools.is_empty());
    }

    #[tokio::test]
    async fn test_reviewer_failure_is_review_error() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.fail("connection reset");
        let err = agent(llm)
            .review(&AppConfig::default(), &ctx(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Llm(_)));
    }
}
