//! 仓库级工具：列出 / 搜索 / 元数据 / 分支 / 创建仓库

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::github::{GitHubClient, DEFAULT_MAX_PAGES};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

/// 搜索结果最多取 10 页
const SEARCH_MAX_PAGES: u32 = 10;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    #[default]
    All,
    Public,
    Private,
    Forks,
    Sources,
    Member,
}

impl RepoType {
    fn as_str(&self) -> &'static str {
        match self {
            RepoType::All => "all",
            RepoType::Public => "public",
            RepoType::Private => "private",
            RepoType::Forks => "forks",
            RepoType::Sources => "sources",
            RepoType::Member => "member",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListReposArgs {
    /// Type of repositories to list
    #[serde(default, rename = "type")]
    pub repo_type: RepoType,
}

pub struct ListGithubReposTool {
    gh: Arc<GitHubClient>,
}

impl ListGithubReposTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for ListGithubReposTool {
    fn name(&self) -> &str {
        "list_github_repos"
    }

    fn description(&self) -> &str {
        "List the user's GitHub repositories."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ListReposArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ListReposArgs = parse_args(args)?;
        tracing::info!(repo_type = args.repo_type.as_str(), "Listing GitHub repositories");
        let url = self.gh.api_url("user/repos");
        let repos = self
            .gh
            .get_paginated(&url, &[("type", args.repo_type.as_str().to_string())], DEFAULT_MAX_PAGES)
            .await;
        let names: Vec<&str> = repos
            .iter()
            .filter_map(|r| r.get("full_name").and_then(Value::as_str))
            .collect();
        tracing::info!(count = names.len(), "Found repositories");
        Ok(json!(names).to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Search query
    pub query: String,
}

/// 在用户自己的仓库中搜索代码（/search/code，限定 user:<username>）
pub struct SearchGithubReposTool {
    gh: Arc<GitHubClient>,
    username: Option<String>,
}

impl SearchGithubReposTool {
    pub fn new(gh: Arc<GitHubClient>, username: Option<String>) -> Self {
        Self { gh, username }
    }
}

#[async_trait]
impl Tool for SearchGithubReposTool {
    fn name(&self) -> &str {
        "search_github_repos"
    }

    fn description(&self) -> &str {
        "Search for code in the user's GitHub repositories."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SearchArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SearchArgs = parse_args(args)?;
        let q = match &self.username {
            Some(user) => format!("{} user:{}", args.query, user),
            None => args.query.clone(),
        };
        tracing::info!(query = %args.query, "Searching repositories");
        let url = self.gh.api_url("search/code");
        let items = self
            .gh
            .get_paginated(&url, &[("q", q)], SEARCH_MAX_PAGES)
            .await;
        let results: Vec<Value> = items
            .iter()
            .map(|item| {
                json!({
                    "name": item.get("name"),
                    "path": item.get("path"),
                    "repository": item.pointer("/repository/full_name"),
                    "html_url": item.get("html_url"),
                })
            })
            .collect();
        tracing::info!(count = results.len(), "Found search results");
        Ok(Value::Array(results).to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RepoArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
}

pub struct GetRepoInfoTool {
    gh: Arc<GitHubClient>,
}

impl GetRepoInfoTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for GetRepoInfoTool {
    fn name(&self) -> &str {
        "get_repo_info"
    }

    fn description(&self) -> &str {
        "Get metadata information about a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RepoArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: RepoArgs = parse_args(args)?;
        let url = self.gh.api_url(&format!("repos/{}", args.repo));
        let data = self
            .gh
            .get_json(&url, &[])
            .await
            .map_err(|e| format!("Error getting repository info: {}", e.diagnostic()))?;
        let info = json!({
            "full_name": data.get("full_name"),
            "description": data.get("description"),
            "stars": data.get("stargazers_count"),
            "forks": data.get("forks_count"),
            "open_issues": data.get("open_issues_count"),
            "default_branch": data.get("default_branch"),
            "language": data.get("language"),
            "created_at": data.get("created_at"),
            "updated_at": data.get("updated_at"),
            "html_url": data.get("html_url"),
        });
        Ok(info.to_string())
    }
}

pub struct ListRepoBranchesTool {
    gh: Arc<GitHubClient>,
}

impl ListRepoBranchesTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for ListRepoBranchesTool {
    fn name(&self) -> &str {
        "list_repo_branches"
    }

    fn description(&self) -> &str {
        "List all branches in a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RepoArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: RepoArgs = parse_args(args)?;
        let url = self.gh.api_url(&format!("repos/{}/branches", args.repo));
        let branches = self.gh.get_paginated(&url, &[], DEFAULT_MAX_PAGES).await;
        let names: Vec<&str> = branches
            .iter()
            .filter_map(|b| b.get("name").and_then(Value::as_str))
            .collect();
        tracing::info!(repo = %args.repo, count = names.len(), "Found branches");
        Ok(json!(names).to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRepositoryArgs {
    /// Repository name, unique under your account, e.g. 'data-analysis-tool'
    pub name: String,
    /// Repository description
    #[serde(default)]
    pub description: String,
    /// true for private, false for public
    #[serde(default)]
    pub private: bool,
}

/// 创建仓库（破坏性操作，需确认；自动初始化 README）
pub struct CreateRepositoryTool {
    gh: Arc<GitHubClient>,
}

impl CreateRepositoryTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for CreateRepositoryTool {
    fn name(&self) -> &str {
        "create_repository"
    }

    fn description(&self) -> &str {
        "Create a new GitHub repository. NOTE: This operation requires user confirmation. \
         The repository is created under the authenticated user's account and initialized with a README."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CreateRepositoryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CreateRepositoryArgs = parse_args(args)?;
        tracing::info!(name = %args.name, private = args.private, "Creating repository");
        let body = json!({
            "name": args.name,
            "description": args.description,
            "private": args.private,
            "auto_init": true,
        });
        let url = self.gh.api_url("user/repos");
        let data = self
            .gh
            .request(Method::POST, &url, Some(&body), &[])
            .await
            .and_then(|r| r.json())
            .map_err(|e| format!("Error creating repository: {}", e.diagnostic()))?;
        let html_url = data
            .get("html_url")
            .and_then(Value::as_str)
            .ok_or_else(|| "Error creating repository: response has no html_url".to_string())?;
        tracing::info!(url = html_url, "Repository created");
        Ok(html_url.to_string())
    }
}
