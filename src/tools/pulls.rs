//! Pull request 工具与提交流程
//!
//! 提交顺序：权限预检 → 默认分支 → base ref → base tree → 新 tree → 新 commit → 新分支 ref → PR。
//! base ref 404 表示空仓库，改为 Contents API 在新分支上逐个写文件后直接开 PR。

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::github::{GitHubClient, GitHubError};
use crate::review::{FileChange, PullRequestDraft};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

/// 普通文件的 tree 条目模式
const FILE_MODE: &str = "100644";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePullRequestArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Pull request title
    pub title: String,
    /// Pull request description
    pub body: String,
    /// Name of the new branch to create
    pub new_branch: String,
    /// Files to create or update with their full new content
    pub files: Vec<FileChange>,
    /// Commit message for the changes
    pub commit_message: String,
    /// Base branch, defaults to the repository's default branch
    pub base_branch: Option<String>,
    /// Enable peer review before submission, defaults to the configured setting
    pub enable_peer_review: Option<bool>,
}

impl CreatePullRequestArgs {
    pub fn into_draft(self) -> PullRequestDraft {
        PullRequestDraft {
            repo: self.repo,
            title: self.title,
            body: self.body,
            files: self.files,
            commit_message: self.commit_message,
            branch_name: self.new_branch,
            base_branch: self.base_branch,
        }
    }
}

/// approve / review 共用的 PR 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PullRequestDraftArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Pull request title
    pub title: String,
    /// Pull request description
    pub body: String,
    /// Files with their full new content
    pub files: Vec<FileChange>,
    /// Commit message
    pub commit_message: String,
    /// Branch name for the PR
    pub branch_name: String,
    /// Base branch, defaults to the repository's default branch
    pub base_branch: Option<String>,
}

impl PullRequestDraftArgs {
    pub fn into_draft(self) -> PullRequestDraft {
        PullRequestDraft {
            repo: self.repo,
            title: self.title,
            body: self.body,
            files: self.files,
            commit_message: self.commit_message,
            branch_name: self.branch_name,
            base_branch: self.base_branch,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IteratePullRequestArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Pull request title (can be updated)
    pub title: String,
    /// Pull request description (can be updated)
    pub body: String,
    /// Updated list of files with improvements
    pub files: Vec<FileChange>,
    /// Updated commit message
    pub commit_message: String,
    /// New branch name for the iteration
    pub branch_name: String,
    /// Base branch, defaults to the repository's default branch
    pub base_branch: Option<String>,
    /// Summary of the peer review feedback this iteration addresses
    pub feedback_context: Option<String>,
}

impl IteratePullRequestArgs {
    /// 有 feedback_context 时追加到 PR 描述末尾
    pub fn into_draft(self) -> PullRequestDraft {
        let body = match self.feedback_context.filter(|c| !c.trim().is_empty()) {
            Some(ctx) => format!(
                "{}\n\n---\n**Peer Review Iteration:**\nAddressed feedback: {}",
                self.body, ctx
            ),
            None => self.body,
        };
        PullRequestDraft {
            repo: self.repo,
            title: self.title,
            body,
            files: self.files,
            commit_message: self.commit_message,
            branch_name: self.branch_name,
            base_branch: self.base_branch,
        }
    }
}

fn sha_at(value: &Value, pointer: &str, step: &str) -> Result<String, String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| format!("Error creating pull request: {} response has no '{}'", step, pointer))
}

fn original(e: &GitHubError) -> String {
    format!("Original error: {}", e)
}

/// 提交一个 PR 草稿到 GitHub，成功返回 PR 的 html_url
pub async fn submit_pull_request(gh: &GitHubClient, draft: &PullRequestDraft) -> Result<String, String> {
    if draft.files.is_empty() {
        return Err("Error: 'files' must be a non-empty list".to_string());
    }
    let repo = draft.repo.as_str();
    tracing::info!(repo, title = %draft.title, files = draft.files.len(), "Creating pull request");

    check_push_permission(gh, repo).await?;

    let base = match &draft.base_branch {
        Some(b) if !b.trim().is_empty() => b.clone(),
        _ => gh
            .get_default_branch(repo)
            .await
            .map_err(|e| format!("Error creating pull request: {}", e.diagnostic()))?,
    };

    let ref_url = gh.api_url(&format!("repos/{}/git/ref/heads/{}", repo, base));
    let base_commit_sha = match gh.get_json(&ref_url, &[]).await {
        Ok(data) => sha_at(&data, "/object/sha", "base ref")?,
        Err(e) if e.is_not_found() => {
            tracing::info!(repo, branch = %draft.branch_name, "Repository appears to be empty, creating files on new branch");
            create_files_in_empty_repo(gh, repo, &draft.files, &draft.branch_name).await?;
            return open_pull_request(gh, draft, &base).await;
        }
        Err(e) => return Err(format!("Error creating pull request: {}", e.diagnostic())),
    };

    let commit_url = gh.api_url(&format!("repos/{}/git/commits/{}", repo, base_commit_sha));
    let base_tree_sha = match gh.get_json(&commit_url, &[]).await {
        Ok(data) => sha_at(&data, "/tree/sha", "base commit")?,
        Err(e) if e.is_not_found() => {
            return Err(format!(
                "Error: Unable to get commit tree (404).\n\
                 This typically indicates:\n\
                 \x20 - Commit SHA '{}' is invalid\n\
                 \x20 - Repository access permissions issue\n\
                 {}",
                base_commit_sha,
                original(&e)
            ))
        }
        Err(e) => return Err(format!("Error creating pull request: {}", e.diagnostic())),
    };

    let tree: Vec<Value> = draft
        .files
        .iter()
        .map(|f| {
            json!({
                "path": f.file_path,
                "mode": FILE_MODE,
                "type": "blob",
                "content": f.new_content,
            })
        })
        .collect();
    let tree_url = gh.api_url(&format!("repos/{}/git/trees", repo));
    let tree_body = json!({"base_tree": base_tree_sha, "tree": tree});
    let new_tree_sha = match post_json(gh, &tree_url, &tree_body).await {
        Ok(data) => sha_at(&data, "/sha", "tree")?,
        Err(e) if e.is_not_found() => {
            let paths: Vec<&str> = draft.files.iter().map(|f| f.file_path.as_str()).collect();
            return Err(format!(
                "Error: Unable to create git tree (404). This typically indicates:\n\
                 \x20 - Insufficient repository permissions (needs 'push' access)\n\
                 \x20 - GitHub token may be expired or invalid\n\
                 \x20 - Repository may be private and token lacks access\n\
                 \x20 - Temporary GitHub API authentication issue\n\
                 \x20 - Invalid base_tree SHA (repository may be empty)\n\
                 Note: GitHub automatically creates directory structure for nested file paths.\n\
                 Files being created: {:?}\n\
                 {}",
                paths,
                original(&e)
            ));
        }
        Err(e) => return Err(format!("Error creating pull request: {}", e.diagnostic())),
    };

    let new_commit_url = gh.api_url(&format!("repos/{}/git/commits", repo));
    let commit_body = json!({
        "message": draft.commit_message,
        "tree": new_tree_sha,
        "parents": [base_commit_sha],
    });
    let new_commit_sha = match post_json(gh, &new_commit_url, &commit_body).await {
        Ok(data) => sha_at(&data, "/sha", "commit")?,
        Err(e) if e.is_not_found() => {
            return Err(format!(
                "Error: Unable to create commit (404). This typically indicates:\n\
                 \x20 - Authentication/permission issue with repository\n\
                 \x20 - GitHub token lacks 'contents:write' permission\n\
                 {}",
                original(&e)
            ))
        }
        Err(e) => return Err(format!("Error creating pull request: {}", e.diagnostic())),
    };

    let refs_url = gh.api_url(&format!("repos/{}/git/refs", repo));
    let ref_body = json!({"ref": format!("refs/heads/{}", draft.branch_name), "sha": new_commit_sha});
    match post_json(gh, &refs_url, &ref_body).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            return Err(format!(
                "Error: Unable to create branch '{}' (404). This typically indicates:\n\
                 \x20 - Insufficient repository permissions\n\
                 \x20 - Authentication issue with GitHub token\n\
                 {}",
                draft.branch_name,
                original(&e)
            ))
        }
        Err(e) if e.status() == Some(422) => {
            return Err(format!(
                "Error: Branch '{}' already exists. Please use a different branch name.",
                draft.branch_name
            ))
        }
        Err(e) => return Err(format!("Error creating pull request: {}", e.diagnostic())),
    }

    open_pull_request(gh, draft, &base).await
}

async fn post_json(gh: &GitHubClient, url: &str, body: &Value) -> Result<Value, GitHubError> {
    gh.request(Method::POST, url, Some(body), &[]).await?.json()
}

/// 预检 push 权限；仓库不存在时报错，其他失败只记录 warn 后继续
async fn check_push_permission(gh: &GitHubClient, repo: &str) -> Result<(), String> {
    let url = gh.api_url(&format!("repos/{}", repo));
    match gh.get_json(&url, &[]).await {
        Ok(data) => {
            let permissions = data.get("permissions").cloned().unwrap_or_else(|| json!({}));
            let can_push = permissions.get("push").and_then(Value::as_bool).unwrap_or(false);
            if can_push {
                Ok(())
            } else {
                Err(format!(
                    "Error: Insufficient permissions for repository '{}'.\n\
                     Your GitHub token needs 'push' access to create pull requests.\n\
                     Current permissions: {}",
                    repo, permissions
                ))
            }
        }
        Err(e) if e.is_not_found() => Err(format!(
            "Error: Repository '{}' not found or not accessible.\n\
             Please check:\n\
             \x20 - Repository name is correct\n\
             \x20 - GitHub token has access to this repository\n\
             \x20 - Repository exists and is not private (if using public token)",
            repo
        )),
        Err(e) => {
            tracing::warn!(repo, error = %e, "Could not validate repository permissions");
            Ok(())
        }
    }
}

async fn create_files_in_empty_repo(
    gh: &GitHubClient,
    repo: &str,
    files: &[FileChange],
    branch: &str,
) -> Result<(), String> {
    for file in files {
        let url = gh.api_url(&format!(
            "repos/{}/contents/{}",
            repo,
            file.file_path.trim_start_matches('/')
        ));
        let body = json!({
            "message": format!("Create {}", file.file_path),
            "content": base64::engine::general_purpose::STANDARD.encode(file.new_content.as_bytes()),
            "branch": branch,
        });
        gh.request(Method::PUT, &url, Some(&body), &[])
            .await
            .map_err(|e| format!("Error creating files in empty repository: {}", e.diagnostic()))?;
        tracing::info!(path = %file.file_path, "Created file");
    }
    Ok(())
}

async fn open_pull_request(gh: &GitHubClient, draft: &PullRequestDraft, base: &str) -> Result<String, String> {
    let url = gh.api_url(&format!("repos/{}/pulls", draft.repo));
    let body = json!({
        "title": draft.title,
        "body": draft.body,
        "head": draft.branch_name,
        "base": base,
    });
    match post_json(gh, &url, &body).await {
        Ok(data) => {
            let html_url = sha_at(&data, "/html_url", "pull request")?;
            tracing::info!(url = %html_url, "Pull request created successfully");
            Ok(html_url)
        }
        Err(e) if e.is_not_found() => Err(format!(
            "Error: Unable to create pull request (404). This typically indicates:\n\
             \x20 - Insufficient repository permissions\n\
             \x20 - Repository may not allow pull requests\n\
             \x20 - Authentication issue with GitHub token\n\
             {}",
            original(&e)
        )),
        Err(e) if e.status() == Some(422) => Err(format!(
            "Error: Pull request validation failed. Branch '{}' may have no changes or already has a PR.",
            draft.branch_name
        )),
        Err(e) => Err(format!("Error creating pull request: {}", e.diagnostic())),
    }
}

/// 直接提交 PR；需要评审时由主会话在分发前拦截
pub struct CreatePullRequestTool {
    gh: Arc<GitHubClient>,
}

impl CreatePullRequestTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for CreatePullRequestTool {
    fn name(&self) -> &str {
        "create_pull_request"
    }

    fn description(&self) -> &str {
        "Create a pull request in a GitHub repository with changes to one or more files. \
         When peer review is enabled the change is reviewed by a second agent before submission; \
         follow its feedback and call iterate_pull_request with the improved version."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CreatePullRequestArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CreatePullRequestArgs = parse_args(args)?;
        submit_pull_request(&self.gh, &args.into_draft()).await
    }
}

/// 评审通过后的提交入口（不再评审）
pub struct ApprovePullRequestTool {
    gh: Arc<GitHubClient>,
}

impl ApprovePullRequestTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for ApprovePullRequestTool {
    fn name(&self) -> &str {
        "approve_pull_request"
    }

    fn description(&self) -> &str {
        "Approve and submit a pull request to GitHub after peer review. Submits without another review pass."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<PullRequestDraftArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let draft = parse_args::<PullRequestDraftArgs>(args)?.into_draft();
        tracing::info!(repo = %draft.repo, title = %draft.title, "Approving and submitting PR");
        submit_pull_request(&self.gh, &draft).await
    }
}

/// 迭代 PR；总是经过评审，只能由主会话处理
pub struct IteratePullRequestTool;

#[async_trait]
impl Tool for IteratePullRequestTool {
    fn name(&self) -> &str {
        "iterate_pull_request"
    }

    fn description(&self) -> &str {
        "Create an improved version of a pull request based on peer review feedback. \
         The new version is always peer reviewed before submission."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<IteratePullRequestArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Err("Error: Pull request iteration is only available from the main agent session".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergeArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Pull request number
    pub pr_number: u64,
    /// Merge method
    #[serde(default)]
    pub merge_method: MergeMethod,
}

pub struct MergePullRequestTool {
    gh: Arc<GitHubClient>,
}

impl MergePullRequestTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for MergePullRequestTool {
    fn name(&self) -> &str {
        "merge_pull_request"
    }

    fn description(&self) -> &str {
        "Merge a pull request."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<MergeArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: MergeArgs = parse_args(args)?;
        let url = self
            .gh
            .api_url(&format!("repos/{}/pulls/{}/merge", args.repo, args.pr_number));
        self.gh
            .request(
                Method::PUT,
                &url,
                Some(&json!({"merge_method": args.merge_method.as_str()})),
                &[],
            )
            .await
            .map_err(|e| format!("Error merging pull request: {}", e.diagnostic()))?;
        Ok(format!(
            "Pull request #{} merged successfully in {}.",
            args.pr_number, args.repo
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> Value {
        json!([{"file_path": "README.md", "new_content": "# demo\n"}])
    }

    #[test]
    fn test_iterate_appends_feedback_context() {
        let args: IteratePullRequestArgs = parse_args(json!({
            "repo": "octo/demo",
            "title": "Docs",
            "body": "Update docs",
            "files": file(),
            "commit_message": "docs",
            "branch_name": "docs-v2",
            "feedback_context": "added examples"
        }))
        .unwrap();
        let draft = args.into_draft();
        assert_eq!(
            draft.body,
            "Update docs\n\n---\n**Peer Review Iteration:**\nAddressed feedback: added examples"
        );
        assert_eq!(draft.branch_name, "docs-v2");
    }

    #[test]
    fn test_create_args_map_new_branch() {
        let args: CreatePullRequestArgs = parse_args(json!({
            "repo": "octo/demo",
            "title": "Docs",
            "body": "b",
            "new_branch": "docs",
            "files": file(),
            "commit_message": "docs",
            "enable_peer_review": false
        }))
        .unwrap();
        assert_eq!(args.enable_peer_review, Some(false));
        let draft = args.into_draft();
        assert_eq!(draft.branch_name, "docs");
        assert_eq!(draft.files.len(), 1);
        assert!(draft.base_branch.is_none());
    }

    #[test]
    fn test_merge_method_defaults_to_merge() {
        let args: MergeArgs = parse_args(json!({"repo": "o/r", "pr_number": 7})).unwrap();
        assert_eq!(args.merge_method.as_str(), "merge");
        let schema = args_schema::<MergeArgs>();
        assert_eq!(schema["required"], json!(["pr_number", "repo"]));
    }
}
