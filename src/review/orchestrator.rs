//! 同行评审编排
//!
//! 状态：Reviewing(i) → Approved | MajorRevision | ChangesRequested | MaxIterationsReached。
//! 每次调用最多进行一轮评审；RequestChanges 未到上限时返回非终态结果，由主 Agent 修改后再次提交。
//! 评审调用失败时按 `peer_review.on_failure` 处理：默认放行（降级路径，记录 warn），或交给用户 approve / retry / cancel。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ReviewFailurePolicy};
use crate::core::AgentError;
use crate::review::{
    Decision, PeerReviewContext, PeerReviewResult, ReviewError, ReviewVerdict, Reviewer,
};

/// 评审失败时用户的选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureChoice {
    Approve,
    Retry,
    Cancel,
}

/// 编排器需要的外部决策（终端交互或测试脚本）
#[async_trait]
pub trait ReviewPrompt: Send + Sync {
    /// 达到最大轮数：true 表示仍然提交
    async fn final_decision(&self, ctx: &PeerReviewContext) -> bool;

    async fn on_review_failure(&self, error: &str) -> FailureChoice;

    /// 展示一轮评审结论
    fn show_verdict(&self, _verdict: &ReviewVerdict, _iteration: usize) {}
}

/// 预置答案的 ReviewPrompt
#[derive(Debug)]
pub struct StaticReviewPrompt {
    submit_at_limit: bool,
    failure_choices: Mutex<VecDeque<FailureChoice>>,
    final_decisions: Mutex<usize>,
}

impl StaticReviewPrompt {
    pub fn new(submit_at_limit: bool) -> Self {
        Self {
            submit_at_limit,
            failure_choices: Mutex::new(VecDeque::new()),
            final_decisions: Mutex::new(0),
        }
    }

    /// 依次返回的失败处理选择；用完后为 Cancel
    pub fn with_failure_choices(self, choices: &[FailureChoice]) -> Self {
        if let Ok(mut q) = self.failure_choices.lock() {
            q.extend(choices.iter().copied());
        }
        self
    }

    /// final_decision 被调用的次数
    pub fn final_decisions(&self) -> usize {
        self.final_decisions.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl ReviewPrompt for StaticReviewPrompt {
    async fn final_decision(&self, _ctx: &PeerReviewContext) -> bool {
        if let Ok(mut n) = self.final_decisions.lock() {
            *n += 1;
        }
        self.submit_at_limit
    }

    async fn on_review_failure(&self, _error: &str) -> FailureChoice {
        self.failure_choices
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(FailureChoice::Cancel)
    }
}

pub struct PeerReviewOrchestrator {
    reviewer: Arc<dyn Reviewer>,
    prompt: Arc<dyn ReviewPrompt>,
}

impl PeerReviewOrchestrator {
    pub fn new(reviewer: Arc<dyn Reviewer>, prompt: Arc<dyn ReviewPrompt>) -> Self {
        Self { reviewer, prompt }
    }

    /// 单次评审，不记录、不推进状态（review_pull_request 工具）
    pub async fn review_once(
        &self,
        cfg: &AppConfig,
        ctx: &PeerReviewContext,
        cancel: &CancellationToken,
    ) -> Result<ReviewVerdict, ReviewError> {
        self.reviewer.review(cfg, ctx, cancel).await
    }

    /// 对当前草稿做一轮评审并给出结果
    pub async fn review(
        &self,
        cfg: &AppConfig,
        ctx: &mut PeerReviewContext,
        cancel: &CancellationToken,
    ) -> Result<PeerReviewResult, AgentError> {
        let max_iterations = cfg.peer_review.max_iterations.max(1);

        if ctx.current_iteration >= max_iterations {
            tracing::warn!(
                iterations = ctx.current_iteration,
                "Maximum review iterations already reached"
            );
            let (feedback, suggestions) = match ctx.last_record() {
                Some(r) => (r.feedback.clone(), r.suggestions.clone()),
                None => (
                    "Maximum review iterations reached".to_string(),
                    vec!["Please review and improve the code manually".to_string()],
                ),
            };
            return Ok(self.resolve_max_iterations(ctx, feedback, suggestions).await);
        }

        loop {
            tracing::info!(iteration = ctx.current_iteration + 1, max_iterations, "Review iteration");
            let verdict = match self.reviewer.review(cfg, ctx, cancel).await {
                Ok(verdict) => verdict,
                Err(ReviewError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    tracing::error!(error = %e, "Peer review iteration failed");
                    match cfg.peer_review.on_failure {
                        ReviewFailurePolicy::FailOpen => return Ok(self.fail_open(ctx, &e)),
                        ReviewFailurePolicy::Ask => match self.prompt.on_review_failure(&e.to_string()).await {
                            FailureChoice::Approve => return Ok(self.fail_open(ctx, &e)),
                            FailureChoice::Retry => {
                                tracing::info!("Retrying peer review");
                                continue;
                            }
                            FailureChoice::Cancel => {
                                tracing::info!("Pull request submission cancelled after review failure");
                                return Ok(PeerReviewResult {
                                    decision: Decision::NeedsMajorRevision,
                                    feedback: format!("Review cancelled due to error: {}", e),
                                    suggestions: vec![
                                        "Please fix the peer review system or submit manually".to_string(),
                                    ],
                                    should_proceed: false,
                                    iteration_count: ctx.current_iteration,
                                    max_iterations_reached: false,
                                });
                            }
                        },
                    }
                }
            };

            ctx.record(&verdict);
            self.prompt.show_verdict(&verdict, ctx.current_iteration);
            tracing::info!(
                decision = %verdict.decision,
                iteration = ctx.current_iteration,
                source = ?verdict.source,
                "Peer review verdict"
            );

            return Ok(match verdict.decision {
                Decision::Approve => {
                    PeerReviewResult::from_verdict(&verdict, true, ctx.current_iteration)
                }
                Decision::NeedsMajorRevision => {
                    PeerReviewResult::from_verdict(&verdict, false, ctx.current_iteration)
                }
                Decision::RequestChanges if ctx.current_iteration >= max_iterations => {
                    self.resolve_max_iterations(ctx, verdict.feedback, verdict.suggestions)
                        .await
                }
                Decision::RequestChanges => {
                    PeerReviewResult::from_verdict(&verdict, false, ctx.current_iteration)
                }
            });
        }
    }

    async fn resolve_max_iterations(
        &self,
        ctx: &PeerReviewContext,
        feedback: String,
        suggestions: Vec<String>,
    ) -> PeerReviewResult {
        let submit = self.prompt.final_decision(ctx).await;
        tracing::info!(submit, iterations = ctx.current_iteration, "Final decision at iteration limit");
        PeerReviewResult {
            decision: Decision::RequestChanges,
            feedback,
            suggestions,
            should_proceed: submit,
            iteration_count: ctx.current_iteration,
            max_iterations_reached: true,
        }
    }

    /// 评审失败时放行：记录为 FailOpen 来源的一轮
    fn fail_open(&self, ctx: &mut PeerReviewContext, error: &ReviewError) -> PeerReviewResult {
        let verdict = ReviewVerdict::fail_open(&error.to_string());
        ctx.record(&verdict);
        tracing::warn!(
            error = %error,
            iteration = ctx.current_iteration,
            "Peer review failed; approving without review (reduced-safety path)"
        );
        PeerReviewResult::from_verdict(&verdict, true, ctx.current_iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{FileChange, PullRequestDraft, VerdictSource};

    struct ScriptedReviewer {
        replies: Mutex<VecDeque<Result<Decision, String>>>,
    }

    impl ScriptedReviewer {
        fn new(replies: Vec<Result<Decision, String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl Reviewer for ScriptedReviewer {
        async fn review(
            &self,
            _cfg: &AppConfig,
            _ctx: &PeerReviewContext,
            _cancel: &CancellationToken,
        ) -> Result<ReviewVerdict, ReviewError> {
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(decision)) => Ok(ReviewVerdict {
                    decision,
                    feedback: format!("{} feedback", decision),
                    suggestions: vec!["s1".into()],
                    reasoning: None,
                    source: VerdictSource::Parsed,
                }),
                Some(Err(e)) => Err(ReviewError::Session(e)),
                None => Err(ReviewError::EmptyResponse),
            }
        }
    }

    fn ctx() -> PeerReviewContext {
        PeerReviewContext::new(
            PullRequestDraft {
                repo: "octo/demo".into(),
                title: "t".into(),
                body: "b".into(),
                files: vec![FileChange {
                    file_path: "a.rs".into(),
                    new_content: "fn a() {}".into(),
                }],
                commit_message: "c".into(),
                branch_name: "br".into(),
                base_branch: None,
            },
            None,
        )
    }

    fn orchestrator(
        replies: Vec<Result<Decision, String>>,
        prompt: Arc<StaticReviewPrompt>,
    ) -> PeerReviewOrchestrator {
        PeerReviewOrchestrator::new(Arc::new(ScriptedReviewer::new(replies)), prompt)
    }

    #[tokio::test]
    async fn test_approve_and_major_revision_are_terminal() {
        let prompt = Arc::new(StaticReviewPrompt::new(false));
        let o = orchestrator(
            vec![Ok(Decision::Approve), Ok(Decision::NeedsMajorRevision)],
            prompt,
        );
        let cfg = AppConfig::default();
        let cancel = CancellationToken::new();

        let mut c = ctx();
        let r = o.review(&cfg, &mut c, &cancel).await.unwrap();
        assert!(r.should_proceed);
        assert!(r.is_terminal());
        assert_eq!(r.iteration_count, 1);

        let mut c = ctx();
        let r = o.review(&cfg, &mut c, &cancel).await.unwrap();
        assert!(!r.should_proceed);
        assert!(r.is_terminal());
    }

    #[tokio::test]
    async fn test_k_request_changes_reach_max_iterations() {
        let prompt = Arc::new(StaticReviewPrompt::new(true));
        let o = orchestrator(vec![Ok(Decision::RequestChanges); 3], prompt.clone());
        let cfg = AppConfig::default();
        let cancel = CancellationToken::new();
        let mut c = ctx();

        for i in 1..3 {
            let r = o.review(&cfg, &mut c, &cancel).await.unwrap();
            assert!(!r.should_proceed);
            assert!(!r.is_terminal());
            assert_eq!(r.iteration_count, i);
        }
        assert_eq!(prompt.final_decisions(), 0);

        let r = o.review(&cfg, &mut c, &cancel).await.unwrap();
        assert!(r.max_iterations_reached);
        assert!(r.should_proceed);
        assert!(r.is_terminal());
        assert_eq!(r.iteration_count, 3);
        assert_eq!(prompt.final_decisions(), 1);
        assert_eq!(c.review_history.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_fails_open_by_default() {
        let prompt = Arc::new(StaticReviewPrompt::new(false));
        let o = orchestrator(vec![Err("timeout".into())], prompt);
        let mut c = ctx();
        let r = o
            .review(&AppConfig::default(), &mut c, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(r.decision, Decision::Approve);
        assert!(r.should_proceed);
        assert_eq!(r.suggestions.len(), 3);
        assert_eq!(c.review_history[0].source, VerdictSource::FailOpen);
    }

    #[tokio::test]
    async fn test_ask_policy_retry_then_cancel() {
        let prompt = Arc::new(
            StaticReviewPrompt::new(false)
                .with_failure_choices(&[FailureChoice::Retry, FailureChoice::Cancel]),
        );
        let o = orchestrator(vec![Err("boom".into()), Err("boom again".into())], prompt);
        let mut cfg = AppConfig::default();
        cfg.peer_review.on_failure = ReviewFailurePolicy::Ask;
        let mut c = ctx();
        let r = o.review(&cfg, &mut c, &CancellationToken::new()).await.unwrap();
        assert_eq!(r.decision, Decision::NeedsMajorRevision);
        assert!(!r.should_proceed);
        assert!(r.feedback.starts_with("Review cancelled due to error:"));
        assert_eq!(c.current_iteration, 0);
    }
}
