//! 提交相关工具：历史、详情、diff、比较

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::github::GitHubClient;
use crate::tools::contents::branch_or_default;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

fn file_changes(files: Option<&Value>) -> Vec<Value> {
    files
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .map(|f| {
                    json!({
                        "filename": f.get("filename"),
                        "status": f.get("status"),
                        "additions": f.get("additions"),
                        "deletions": f.get("deletions"),
                        "changes": f.get("changes"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CommitHistoryArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Branch name, defaults to the repository's default branch
    pub branch: Option<String>,
    /// Maximum number of commits to return
    #[serde(default = "default_max_commits")]
    pub max_commits: u32,
}

fn default_max_commits() -> u32 {
    10
}

pub struct GetCommitHistoryTool {
    gh: Arc<GitHubClient>,
}

impl GetCommitHistoryTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for GetCommitHistoryTool {
    fn name(&self) -> &str {
        "get_commit_history"
    }

    fn description(&self) -> &str {
        "Get the commit history for a branch in a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CommitHistoryArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CommitHistoryArgs = parse_args(args)?;
        let err = |e: crate::github::GitHubError| {
            format!("Error getting commit history: {}", e.diagnostic())
        };
        let branch = branch_or_default(&self.gh, &args.repo, args.branch)
            .await
            .map_err(err)?;
        let url = self.gh.api_url(&format!("repos/{}/commits", args.repo));
        let data = self
            .gh
            .get_json(
                &url,
                &[
                    ("sha", branch),
                    ("per_page", args.max_commits.clamp(1, 100).to_string()),
                ],
            )
            .await
            .map_err(err)?;

        let commits: Vec<Value> = data
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|c| {
                        json!({
                            "sha": c.get("sha"),
                            "message": c.pointer("/commit/message"),
                            "author": c.pointer("/commit/author/name"),
                            "date": c.pointer("/commit/author/date"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        tracing::info!(count = commits.len(), "Retrieved commits");
        Ok(Value::Array(commits).to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CommitArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Full or short (7+ characters) commit SHA
    pub commit_sha: String,
}

pub struct GetCommitDetailsTool {
    gh: Arc<GitHubClient>,
}

impl GetCommitDetailsTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for GetCommitDetailsTool {
    fn name(&self) -> &str {
        "get_commit_details"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific commit including files changed, additions, deletions \
         and statistics. Returns JSON with commit metadata and file change details."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CommitArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CommitArgs = parse_args(args)?;
        let url = self
            .gh
            .api_url(&format!("repos/{}/commits/{}", args.repo, args.commit_sha));
        let c = self
            .gh
            .get_json(&url, &[])
            .await
            .map_err(|e| format!("Error getting commit details: {}", e.diagnostic()))?;

        let files = file_changes(c.get("files"));
        tracing::info!(files = files.len(), "Retrieved commit details");
        let details = json!({
            "sha": c.get("sha"),
            "message": c.pointer("/commit/message"),
            "author": {
                "name": c.pointer("/commit/author/name"),
                "email": c.pointer("/commit/author/email"),
                "date": c.pointer("/commit/author/date"),
            },
            "committer": {
                "name": c.pointer("/commit/committer/name"),
                "email": c.pointer("/commit/committer/email"),
                "date": c.pointer("/commit/committer/date"),
            },
            "stats": c.get("stats"),
            "files": files,
            "url": c.get("html_url"),
        });
        Ok(details.to_string())
    }
}

/// 以 diff media type 获取统一 diff 文本
pub struct GetCommitDiffTool {
    gh: Arc<GitHubClient>,
}

impl GetCommitDiffTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for GetCommitDiffTool {
    fn name(&self) -> &str {
        "get_commit_diff"
    }

    fn description(&self) -> &str {
        "Get the diff/patch for a specific commit showing exact code changes in unified diff format. \
         TIP: Use get_commit_history first to find the commit SHA."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CommitArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CommitArgs = parse_args(args)?;
        let url = self
            .gh
            .api_url(&format!("repos/{}/commits/{}", args.repo, args.commit_sha));
        let diff = self
            .gh
            .get_text(&url, &[], DIFF_MEDIA_TYPE)
            .await
            .map_err(|e| format!("Error getting commit diff: {}", e.diagnostic()))?;
        tracing::info!(chars = diff.len(), "Retrieved diff content");
        Ok(diff)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompareArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Base commit SHA (older commit)
    pub base_sha: String,
    /// Head commit SHA (newer commit)
    pub head_sha: String,
}

pub struct CompareCommitsTool {
    gh: Arc<GitHubClient>,
}

impl CompareCommitsTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for CompareCommitsTool {
    fn name(&self) -> &str {
        "compare_commits"
    }

    fn description(&self) -> &str {
        "Compare two commits and show the differences between them."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CompareArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CompareArgs = parse_args(args)?;
        let url = self.gh.api_url(&format!(
            "repos/{}/compare/{}...{}",
            args.repo, args.base_sha, args.head_sha
        ));
        let c = self
            .gh
            .get_json(&url, &[])
            .await
            .map_err(|e| format!("Error comparing commits: {}", e.diagnostic()))?;

        let comparison = json!({
            "base_commit": {
                "sha": c.pointer("/base_commit/sha"),
                "message": c.pointer("/base_commit/commit/message"),
            },
            "head_commit": {
                "sha": c.pointer("/head_commit/sha"),
                "message": c.pointer("/head_commit/commit/message"),
            },
            "status": c.get("status"),
            "ahead_by": c.get("ahead_by"),
            "behind_by": c.get("behind_by"),
            "total_commits": c.get("total_commits"),
            "files": file_changes(c.get("files")),
            "url": c.get("html_url"),
        });
        Ok(comparison.to_string())
    }
}
