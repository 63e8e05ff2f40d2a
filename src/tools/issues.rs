//! Issue 工具：列出 / 创建 issue，添加评论

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::github::{GitHubClient, DEFAULT_MAX_PAGES};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueAction {
    List,
    Create,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ManageIssuesArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Action to perform
    pub action: IssueAction,
    /// Issue title (required for create)
    pub title: Option<String>,
    /// Issue body (for create)
    #[serde(default)]
    pub body: String,
    /// Labels for the issue (for create)
    #[serde(default)]
    pub labels: Vec<String>,
}

pub struct ManageIssuesTool {
    gh: Arc<GitHubClient>,
}

impl ManageIssuesTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for ManageIssuesTool {
    fn name(&self) -> &str {
        "manage_issues"
    }

    fn description(&self) -> &str {
        "List open issues or create a new issue in a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ManageIssuesArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ManageIssuesArgs = parse_args(args)?;
        let url = self.gh.api_url(&format!("repos/{}/issues", args.repo));
        match args.action {
            IssueAction::List => {
                let issues = self
                    .gh
                    .get_paginated(&url, &[("state", "open".to_string())], DEFAULT_MAX_PAGES)
                    .await;
                let list: Vec<Value> = issues
                    .iter()
                    .map(|i| json!({"number": i.get("number"), "title": i.get("title")}))
                    .collect();
                tracing::info!(count = list.len(), "Found open issues");
                Ok(Value::Array(list).to_string())
            }
            IssueAction::Create => {
                let title = args
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| "Error: Title required for creating an issue".to_string())?;
                let body = json!({"title": title, "body": args.body, "labels": args.labels});
                let data = self
                    .gh
                    .request(Method::POST, &url, Some(&body), &[])
                    .await
                    .and_then(|r| r.json())
                    .map_err(|e| format!("Error managing issues: {}", e.diagnostic()))?;
                let html_url = data
                    .get("html_url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                tracing::info!(url = %html_url, "Issue created");
                Ok(html_url)
            }
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueCommentArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Issue or pull request number
    pub issue_number: u64,
    /// Comment body (markdown)
    pub comment: String,
}

pub struct AddIssueCommentTool {
    gh: Arc<GitHubClient>,
}

impl AddIssueCommentTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for AddIssueCommentTool {
    fn name(&self) -> &str {
        "add_issue_comment"
    }

    fn description(&self) -> &str {
        "Add a comment to an issue or pull request."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<IssueCommentArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: IssueCommentArgs = parse_args(args)?;
        let url = self.gh.api_url(&format!(
            "repos/{}/issues/{}/comments",
            args.repo, args.issue_number
        ));
        self.gh
            .request(Method::POST, &url, Some(&json!({"body": args.comment})), &[])
            .await
            .map_err(|e| format!("Error adding comment: {}", e.diagnostic()))?;
        Ok(format!(
            "Comment added to issue #{} in {}.",
            args.issue_number, args.repo
        ))
    }
}
