//! 评审相关工具：review_pull_request（由主会话拦截）与 request_pr_changes（纯格式化）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::pulls::PullRequestDraftArgs;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

/// 单次评审；实际执行在主会话中完成
pub struct ReviewPullRequestTool;

#[async_trait]
impl Tool for ReviewPullRequestTool {
    fn name(&self) -> &str {
        "review_pull_request"
    }

    fn description(&self) -> &str {
        "Review a pull request draft with the peer review agent without submitting it. \
         Returns JSON with the decision, feedback and suggestions."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<PullRequestDraftArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Err("Error: Peer review is only available from the main agent session".to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RequestChangesArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Pull request title
    pub title: String,
    /// Peer review feedback
    pub feedback: String,
    /// Specific suggestions for improvement
    pub suggestions: Vec<String>,
    /// Current review iteration number
    #[serde(default = "default_iteration")]
    pub current_iteration: u32,
}

fn default_iteration() -> u32 {
    1
}

pub struct RequestPrChangesTool;

#[async_trait]
impl Tool for RequestPrChangesTool {
    fn name(&self) -> &str {
        "request_pr_changes"
    }

    fn description(&self) -> &str {
        "Request changes for a pull request based on peer review feedback."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RequestChangesArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: RequestChangesArgs = parse_args(args)?;
        let mut message = format!(
            "Peer review feedback for PR '{}' in {}:\n\n**Feedback:** {}\n\n**Suggestions:**\n",
            args.title, args.repo, args.feedback
        );
        let lines: Vec<String> = args.suggestions.iter().map(|s| format!("- {}", s)).collect();
        message.push_str(&lines.join("\n"));

        tracing::info!(iteration = args.current_iteration, "Change request created");
        Ok(json!({
            "action": "request_changes",
            "repo": args.repo,
            "title": args.title,
            "feedback": args.feedback,
            "suggestions": args.suggestions,
            "iteration": args.current_iteration,
            "message": message,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_changes_formats_message() {
        let out = RequestPrChangesTool
            .execute(json!({
                "repo": "octo/demo",
                "title": "Add cache",
                "feedback": "Missing eviction",
                "suggestions": ["Add TTL", "Bound size"]
            }))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["action"], "request_changes");
        assert_eq!(v["iteration"], 1);
        assert!(v["message"].as_str().unwrap().ends_with("- Add TTL\n- Bound size"));
    }

    #[tokio::test]
    async fn test_review_tool_outside_session_is_error() {
        let err = ReviewPullRequestTool.execute(json!({})).await.unwrap_err();
        assert!(err.contains("main agent session"));
    }
}
