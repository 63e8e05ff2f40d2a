//! PR 评审闸门（仅主会话）
//!
//! 拦截 create_pull_request（启用评审时）、iterate_pull_request 与 review_pull_request，
//! 交给 PeerReviewOrchestrator；评审通过后再经分发器以 approve_pull_request 提交。
//! 每个仓库最多一个进行中的 PeerReviewContext，RequestChanges 时保留以累计轮数，终态后丢弃；
//! 只有 iterate_pull_request 沿用它，新的 create_pull_request 重新开始。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::review::{PeerReviewContext, PeerReviewOrchestrator, PullRequestDraft, ReviewError};
use crate::tools::dispatcher::parse_arguments;
use crate::tools::schema::parse_args;
use crate::tools::{
    CreatePullRequestArgs, IteratePullRequestArgs, PullRequestDraftArgs, ToolDispatcher, ToolScope,
};

/// 评审通过后用于提交的工具
const SUBMIT_TOOL: &str = "approve_pull_request";

const EMPTY_FILES: &str = "Error: 'files' must be a non-empty list";

enum Intercept {
    /// 新的 PR 提交尝试：丢弃该仓库进行中的评审，从第 0 轮开始
    Create(PullRequestDraft),
    /// 按评审意见修改后的版本：沿用进行中的评审上下文
    Iterate(PullRequestDraft),
    /// 只评审一轮，不提交
    ReviewOnly(PullRequestDraft),
}

pub struct PrReviewGate {
    orchestrator: Arc<PeerReviewOrchestrator>,
    pending: HashMap<String, PeerReviewContext>,
}

impl PrReviewGate {
    pub fn new(orchestrator: Arc<PeerReviewOrchestrator>) -> Self {
        Self {
            orchestrator,
            pending: HashMap::new(),
        }
    }

    /// 仓库上进行中的评审上下文
    pub fn pending(&self, repo: &str) -> Option<&PeerReviewContext> {
        self.pending.get(repo)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// 处理被拦截的调用；返回 None 表示交给分发器正常执行
    pub async fn handle(
        &mut self,
        cfg: &AppConfig,
        dispatcher: &ToolDispatcher,
        call: &ToolCall,
        user_request: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AgentError> {
        if !matches!(
            call.name.as_str(),
            "create_pull_request" | "iterate_pull_request" | "review_pull_request"
        ) {
            return Ok(None);
        }

        let args = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            // 交给分发器生成参数错误文本与审计记录
            Err(_) => return Ok(None),
        };
        if dispatcher.validate(&call.name, &args).is_err() {
            return Ok(None);
        }

        let intercept = match classify(cfg, &call.name, args) {
            Ok(Some(i)) => i,
            Ok(None) => return Ok(None),
            Err(message) => return Ok(Some(message)),
        };
        tracing::info!(tool = %call.name, "Pull request routed through peer review");

        let text = match intercept {
            Intercept::ReviewOnly(draft) => self.review_only(cfg, draft, user_request, cancel).await?,
            Intercept::Create(draft) => {
                if self.pending.remove(&draft.repo).is_some() {
                    tracing::info!(repo = %draft.repo, "Discarding pending review for a new pull request");
                }
                self.review_and_submit(cfg, dispatcher, draft, user_request, cancel)
                    .await?
            }
            Intercept::Iterate(draft) => {
                self.review_and_submit(cfg, dispatcher, draft, user_request, cancel)
                    .await?
            }
        };
        Ok(Some(text))
    }

    async fn review_only(
        &self,
        cfg: &AppConfig,
        draft: PullRequestDraft,
        user_request: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let ctx = PeerReviewContext::new(draft, user_request);
        match self.orchestrator.review_once(cfg, &ctx, cancel).await {
            Ok(verdict) => {
                tracing::info!(decision = %verdict.decision, "Peer review completed");
                Ok(json!({
                    "decision": verdict.decision.as_str(),
                    "feedback": verdict.feedback,
                    "suggestions": verdict.suggestions,
                    "repo": ctx.draft.repo,
                    "title": ctx.draft.title,
                    "branch_name": ctx.draft.branch_name,
                })
                .to_string())
            }
            Err(ReviewError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::error!(error = %e, "Error during peer review");
                Ok(format!("Error during peer review: {}", e))
            }
        }
    }

    async fn review_and_submit(
        &mut self,
        cfg: &AppConfig,
        dispatcher: &ToolDispatcher,
        draft: PullRequestDraft,
        user_request: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let repo = draft.repo.clone();
        let mut ctx = match self.pending.remove(&repo) {
            Some(mut ctx) => {
                tracing::info!(repo = %repo, iteration = ctx.current_iteration, "Continuing peer review");
                ctx.revise(draft);
                ctx
            }
            None => PeerReviewContext::new(draft, user_request),
        };

        let result = match self.orchestrator.review(cfg, &mut ctx, cancel).await {
            Ok(result) => result,
            Err(e) => {
                self.pending.insert(repo, ctx);
                return Err(e);
            }
        };

        let mut message = result.to_agent_message();
        if result.should_proceed {
            let submission = dispatcher
                .dispatch_value(SUBMIT_TOOL, ctx.draft.to_submission_args(), ToolScope::All)
                .await;
            message.push_str("\n\n");
            message.push_str(&submission);
        }

        if result.is_terminal() {
            tracing::info!(repo = %repo, decision = %result.decision, "Peer review finished");
        } else {
            self.pending.insert(repo, ctx);
        }
        Ok(message)
    }
}

/// 将被拦截的调用转换为草稿；Ok(None) 表示 create_pull_request 未启用评审。
/// 没有文件的草稿在评审前就被拒绝。
fn classify(cfg: &AppConfig, name: &str, args: Value) -> Result<Option<Intercept>, String> {
    let intercept = match name {
        "create_pull_request" => {
            let args: CreatePullRequestArgs = parse_args(args)?;
            if !args.enable_peer_review.unwrap_or(cfg.peer_review.enabled) {
                return Ok(None);
            }
            Intercept::Create(args.into_draft())
        }
        "iterate_pull_request" => {
            let args: IteratePullRequestArgs = parse_args(args)?;
            Intercept::Iterate(args.into_draft())
        }
        "review_pull_request" => {
            let args: PullRequestDraftArgs = parse_args(args)?;
            Intercept::ReviewOnly(args.into_draft())
        }
        _ => return Ok(None),
    };
    let draft = match &intercept {
        Intercept::Create(d) | Intercept::Iterate(d) | Intercept::ReviewOnly(d) => d,
    };
    if draft.files.is_empty() {
        return Err(EMPTY_FILES.to_string());
    }
    Ok(Some(intercept))
}
