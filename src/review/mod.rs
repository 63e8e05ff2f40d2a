//! 同行评审：第二个 Agent 在 PR 提交前做有界多轮评审

pub mod agent;
pub mod orchestrator;
pub mod parse;
pub mod types;

pub use agent::{format_review_request, PeerReviewAgent, ReviewError, Reviewer};
pub use orchestrator::{FailureChoice, PeerReviewOrchestrator, ReviewPrompt, StaticReviewPrompt};
pub use parse::{extract_payload, heuristic_decision, parse_strict, parse_verdict, ReviewParseError};
pub use types::{
    Decision, FileChange, PeerReviewContext, PeerReviewResult, PullRequestDraft, ReviewRecord,
    ReviewVerdict, VerdictSource,
};
