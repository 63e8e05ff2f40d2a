//! 同行评审数据模型：Decision、PR 草稿、评审上下文与结果

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 评审结论（封闭三选一，任何解析失败都必须落到其中之一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    RequestChanges,
    NeedsMajorRevision,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::RequestChanges => "request_changes",
            Decision::NeedsMajorRevision => "needs_major_revision",
        }
    }

    /// 严格解析模型给出的字符串（大小写不敏感）
    pub fn parse(s: &str) -> Option<Decision> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Some(Decision::Approve),
            "request_changes" => Some(Decision::RequestChanges),
            "needs_major_revision" => Some(Decision::NeedsMajorRevision),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PR 中的一个文件变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileChange {
    /// Path relative to the repository root, e.g. 'src/main.rs'
    pub file_path: String,
    /// Full new content of the file
    pub new_content: String,
}

/// 待提交的 PR
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestDraft {
    pub repo: String,
    pub title: String,
    pub body: String,
    pub files: Vec<FileChange>,
    pub commit_message: String,
    pub branch_name: String,
    pub base_branch: Option<String>,
}

impl PullRequestDraft {
    /// approve_pull_request 的参数（评审通过后经分发器提交）
    pub fn to_submission_args(&self) -> Value {
        let mut args = serde_json::json!({
            "repo": self.repo,
            "title": self.title,
            "body": self.body,
            "files": self.files,
            "commit_message": self.commit_message,
            "branch_name": self.branch_name,
        });
        if let (Some(base), Value::Object(map)) = (&self.base_branch, &mut args) {
            map.insert("base_branch".into(), Value::String(base.clone()));
        }
        args
    }
}

/// 评审结论的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Parsed,
    Heuristic,
    FailOpen,
}

/// 评审 Agent 单次给出的结论
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewVerdict {
    pub decision: Decision,
    pub feedback: String,
    pub suggestions: Vec<String>,
    pub reasoning: Option<String>,
    pub source: VerdictSource,
}

impl ReviewVerdict {
    /// 评审 Agent 失败时的放行结论
    pub fn fail_open(error: &str) -> Self {
        Self {
            decision: Decision::Approve,
            feedback: format!(
                "Peer review encountered an error and fell back to approval: {}\n\n\
                 **Fallback Review Notes:**\n\
                 - The peer review agent experienced a technical issue\n\
                 - This PR is being approved to avoid blocking development workflow\n\
                 - Consider manual review or retry with peer review disabled\n\
                 - Check logs for detailed error information",
                error
            ),
            suggestions: vec![
                "Consider manual code review due to peer review failure".to_string(),
                "Check application logs for technical details".to_string(),
                "Verify all changes meet coding standards manually".to_string(),
            ],
            reasoning: None,
            source: VerdictSource::FailOpen,
        }
    }
}

/// 评审历史中的一条记录（只追加）
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRecord {
    pub iteration: usize,
    pub decision: Decision,
    pub feedback: String,
    pub suggestions: Vec<String>,
    pub source: VerdictSource,
    pub timestamp: DateTime<Utc>,
}

/// 一次 PR 提交尝试的评审上下文；终态后丢弃
#[derive(Debug, Clone)]
pub struct PeerReviewContext {
    pub draft: PullRequestDraft,
    pub user_request: Option<String>,
    /// 已完成的评审轮数，单调不减
    pub current_iteration: usize,
    pub review_history: Vec<ReviewRecord>,
}

impl PeerReviewContext {
    pub fn new(draft: PullRequestDraft, user_request: Option<String>) -> Self {
        Self {
            draft,
            user_request,
            current_iteration: 0,
            review_history: Vec::new(),
        }
    }

    /// 主 Agent 修改后重新提交：替换草稿，保留轮数与历史
    pub fn revise(&mut self, draft: PullRequestDraft) {
        self.draft = draft;
    }

    /// 记录一轮评审并推进轮数
    pub fn record(&mut self, verdict: &ReviewVerdict) {
        self.current_iteration += 1;
        self.review_history.push(ReviewRecord {
            iteration: self.current_iteration,
            decision: verdict.decision,
            feedback: verdict.feedback.clone(),
            suggestions: verdict.suggestions.clone(),
            source: verdict.source,
            timestamp: Utc::now(),
        });
    }

    pub fn last_record(&self) -> Option<&ReviewRecord> {
        self.review_history.last()
    }
}

/// 编排器返回给会话的结果（不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct PeerReviewResult {
    pub decision: Decision,
    pub feedback: String,
    pub suggestions: Vec<String>,
    pub should_proceed: bool,
    pub iteration_count: usize,
    pub max_iterations_reached: bool,
}

impl PeerReviewResult {
    pub fn from_verdict(
        verdict: &ReviewVerdict,
        should_proceed: bool,
        iteration_count: usize,
    ) -> Self {
        Self {
            decision: verdict.decision,
            feedback: verdict.feedback.clone(),
            suggestions: verdict.suggestions.clone(),
            should_proceed,
            iteration_count,
            max_iterations_reached: false,
        }
    }

    /// 终态后评审上下文应被丢弃；仅「请求修改且未到上限」为非终态
    pub fn is_terminal(&self) -> bool {
        self.should_proceed
            || self.max_iterations_reached
            || self.decision != Decision::RequestChanges
    }

    /// 返回给主 Agent 的工具结果文本
    pub fn to_agent_message(&self) -> String {
        match self.decision {
            Decision::Approve => format!(
                "Pull request approved by peer review agent after {} iteration(s). Proceeding with GitHub submission.",
                self.iteration_count
            ),
            Decision::RequestChanges if self.max_iterations_reached && self.should_proceed => format!(
                "Maximum review iterations ({}) reached. Submitting the pull request as confirmed by the user.\n\n**Last feedback:** {}",
                self.iteration_count, self.feedback
            ),
            Decision::RequestChanges if self.max_iterations_reached => {
                let mut message = format!(
                    "Pull request submission cancelled after {} review iteration(s) without approval.\n\n",
                    self.iteration_count
                );
                message.push_str(&format!("**Feedback:** {}\n\n", self.feedback));
                push_numbered(&mut message, "**Suggestions:**", &self.suggestions);
                message
            }
            Decision::RequestChanges => {
                let mut message = format!(
                    "Peer review feedback (iteration {}):\n\n**Feedback:** {}\n\n",
                    self.iteration_count, self.feedback
                );
                push_numbered(&mut message, "**Suggestions:**", &self.suggestions);
                message.push_str(
                    "\nPlease implement these changes and create an updated pull request.",
                );
                message
            }
            Decision::NeedsMajorRevision => {
                let mut message = format!(
                    "Peer review identified major issues requiring significant revision:\n\n**Feedback:** {}\n\n",
                    self.feedback
                );
                push_numbered(&mut message, "**Critical Issues:**", &self.suggestions);
                message.push_str(
                    "\nThis PR cannot be submitted in its current state. Please address these fundamental issues.",
                );
                message
            }
        }
    }
}

fn push_numbered(out: &mut String, heading: &str, items: &[String]) {
    out.push_str(heading);
    out.push('\n');
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PullRequestDraft {
        PullRequestDraft {
            repo: "octo/demo".into(),
            title: "Add logging".into(),
            body: "Adds logging".into(),
            files: vec![FileChange {
                file_path: "src/log.rs".into(),
                new_content: "pub fn log() {}".into(),
            }],
            commit_message: "Add logging".into(),
            branch_name: "feature/logging".into(),
            base_branch: None,
        }
    }

    #[test]
    fn test_record_advances_iteration() {
        let mut ctx = PeerReviewContext::new(draft(), None);
        ctx.record(&ReviewVerdict::fail_open("boom"));
        ctx.record(&ReviewVerdict::fail_open("boom"));
        assert_eq!(ctx.current_iteration, 2);
        assert_eq!(ctx.review_history.len(), 2);
        assert_eq!(ctx.review_history[1].iteration, 2);
        assert_eq!(ctx.review_history[0].source, VerdictSource::FailOpen);
    }

    #[test]
    fn test_terminal_states() {
        let v = ReviewVerdict {
            decision: Decision::RequestChanges,
            feedback: "f".into(),
            suggestions: vec!["s".into()],
            reasoning: None,
            source: VerdictSource::Parsed,
        };
        let open = PeerReviewResult::from_verdict(&v, false, 1);
        assert!(!open.is_terminal());
        assert!(open.to_agent_message().contains("1. s"));

        let mut capped = open.clone();
        capped.max_iterations_reached = true;
        assert!(capped.is_terminal());

        let approve = ReviewVerdict::fail_open("x");
        assert!(PeerReviewResult::from_verdict(&approve, true, 1).is_terminal());
    }

    #[test]
    fn test_review_history_serializes() {
        let mut ctx = PeerReviewContext::new(draft(), None);
        ctx.record(&ReviewVerdict::fail_open("boom"));
        let value = serde_json::to_value(&ctx.review_history).unwrap();
        assert_eq!(value[0]["iteration"], 1);
        assert_eq!(value[0]["decision"], "approve");
        assert_eq!(value[0]["source"], "fail_open");
        assert!(value[0]["timestamp"].is_string());
    }

    #[test]
    fn test_submission_args_include_base_only_when_set() {
        let mut d = draft();
        assert!(d.to_submission_args().get("base_branch").is_none());
        d.base_branch = Some("develop".into());
        assert_eq!(d.to_submission_args()["base_branch"], "develop");
        assert_eq!(d.to_submission_args()["files"][0]["file_path"], "src/log.rs");
    }
}
