//! 仓库内容工具：读文件、列目录、递归列目录、删除文件

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::github::{GitHubClient, GitHubError};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const SUMMARY_HEAD_LINES: usize = 50;
const SUMMARY_TAIL_LINES: usize = 20;

/// 未指定分支时取仓库默认分支
pub(crate) async fn branch_or_default(
    gh: &GitHubClient,
    repo: &str,
    branch: Option<String>,
) -> Result<String, GitHubError> {
    match branch.filter(|b| !b.trim().is_empty()) {
        Some(b) => Ok(b),
        None => gh.get_default_branch(repo).await,
    }
}

fn contents_url(gh: &GitHubClient, repo: &str, path: &str) -> String {
    gh.api_url(&format!(
        "repos/{}/contents/{}",
        repo,
        path.trim_start_matches('/')
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// File path relative to the repository root
    pub path: String,
    /// Branch name, defaults to the repository's default branch
    pub branch: Option<String>,
}

/// 读取文件；超过 max_file_size_mb 的文件只返回首尾摘要
pub struct GetFileContentTool {
    gh: Arc<GitHubClient>,
    max_file_size_bytes: u64,
}

impl GetFileContentTool {
    pub fn new(gh: Arc<GitHubClient>, max_file_size_mb: u64) -> Self {
        Self {
            gh,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
        }
    }

    async fn large_file_summary(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        file_size: u64,
    ) -> Result<String, String> {
        let raw = self
            .gh
            .get_text(
                &contents_url(&self.gh, repo, path),
                &[("ref", branch.to_string())],
                RAW_MEDIA_TYPE,
            )
            .await
            .map_err(|e| {
                format!(
                    "Error getting large file summary: {}. File size: {} bytes",
                    e, file_size
                )
            })?;
        Ok(summarize_large_file(path, &raw, file_size))
    }
}

/// 大文件摘要：前 50 行，超过 70 行时再附最后 20 行
pub fn summarize_large_file(path: &str, raw: &str, file_size: u64) -> String {
    let lines: Vec<&str> = raw.split('\n').collect();
    let total = lines.len();
    let file_type = path
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("Unknown");

    let mut summary = format!(
        "**Large File Summary: {}**\n\n**File Size:** {} bytes\n**Total Lines:** {}\n**File Type:** {}\n\n",
        path, file_size, total, file_type
    );
    summary.push_str("**First 50 lines:**\n```\n");
    summary.push_str(&lines[..total.min(SUMMARY_HEAD_LINES)].join("\n"));
    summary.push_str("\n```\n\n");

    if total > SUMMARY_HEAD_LINES + SUMMARY_TAIL_LINES {
        summary.push_str(&format!(
            "**... ({} lines omitted) ...**\n\n",
            total - SUMMARY_HEAD_LINES - SUMMARY_TAIL_LINES
        ));
        summary.push_str("**Last 20 lines:**\n```\n");
        summary.push_str(&lines[total - SUMMARY_TAIL_LINES..].join("\n"));
        summary.push_str("\n```\n\n");
    }
    summary.push_str(
        "Tip: For specific sections, ask me to search for patterns or functions within this file.",
    );
    summary
}

#[async_trait]
impl Tool for GetFileContentTool {
    fn name(&self) -> &str {
        "get_file_content"
    }

    fn description(&self) -> &str {
        "Get the content of a file in a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FileArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: FileArgs = parse_args(args)?;
        let err = |e: GitHubError| format!("Error getting file content: {}", e.diagnostic());

        let branch = branch_or_default(&self.gh, &args.repo, args.branch)
            .await
            .map_err(err)?;
        tracing::info!(repo = %args.repo, path = %args.path, branch = %branch, "Getting file content");

        let data = self
            .gh
            .get_json(
                &contents_url(&self.gh, &args.repo, &args.path),
                &[("ref", branch.clone())],
            )
            .await
            .map_err(err)?;

        if data.is_array() {
            return Err(format!("Error: '{}' is a directory, not a file", args.path));
        }

        let size = data.get("size").and_then(Value::as_u64).unwrap_or(0);
        if size > self.max_file_size_bytes {
            tracing::info!(path = %args.path, size, "Large file, providing summary");
            return self
                .large_file_summary(&args.repo, &args.path, &branch, size)
                .await;
        }

        let encoded = data
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("Error: File content not available for '{}'", args.path))?;
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| format!("Error getting file content: invalid base64 ({})", e))?;
        let text = String::from_utf8(bytes).map_err(|_| {
            "Error: File appears to be binary. Content cannot be decoded as UTF-8.".to_string()
        })?;
        tracing::info!(chars = text.len(), "Retrieved file content");
        Ok(text)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DirectoryArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Directory path, empty for the repository root
    #[serde(default)]
    pub path: String,
    /// Branch name, defaults to the repository's default branch
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct DirEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

async fn list_dir(
    gh: &GitHubClient,
    repo: &str,
    path: &str,
    branch: &str,
) -> Result<Vec<DirEntry>, String> {
    let data = gh
        .get_json(&contents_url(gh, repo, path), &[("ref", branch.to_string())])
        .await
        .map_err(|e| format!("Error listing directory contents: {}", e.diagnostic()))?;
    let items = data
        .as_array()
        .ok_or_else(|| format!("Error: '{}' is not a directory", path))?;
    Ok(items
        .iter()
        .map(|item| {
            let field = |k: &str| item.get(k).and_then(Value::as_str).unwrap_or("").to_string();
            DirEntry {
                name: field("name"),
                kind: field("type"),
                path: field("path"),
            }
        })
        .collect())
}

pub struct ListDirectoryContentsTool {
    gh: Arc<GitHubClient>,
}

impl ListDirectoryContentsTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for ListDirectoryContentsTool {
    fn name(&self) -> &str {
        "list_directory_contents"
    }

    fn description(&self) -> &str {
        "List files and subdirectories in a specified path within a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DirectoryArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: DirectoryArgs = parse_args(args)?;
        let branch = branch_or_default(&self.gh, &args.repo, args.branch)
            .await
            .map_err(|e| format!("Error listing directory contents: {}", e.diagnostic()))?;
        let entries = list_dir(&self.gh, &args.repo, &args.path, &branch).await?;
        tracing::info!(count = entries.len(), "Found items in directory");
        serde_json::to_string(&entries).map_err(|e| e.to_string())
    }
}

/// 递归列目录：用显式栈逐层抓取，再自底向上组装嵌套结构
pub struct RecursiveListDirectoryTool {
    gh: Arc<GitHubClient>,
}

impl RecursiveListDirectoryTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

#[async_trait]
impl Tool for RecursiveListDirectoryTool {
    fn name(&self) -> &str {
        "recursive_list_directory"
    }

    fn description(&self) -> &str {
        "Recursively list all files and subdirectories in a GitHub repository."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DirectoryArgs>()
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: DirectoryArgs = parse_args(args)?;
        let branch = branch_or_default(&self.gh, &args.repo, args.branch)
            .await
            .map_err(|e| format!("Error in recursive directory listing: {}", e.diagnostic()))?;

        let mut listings: HashMap<String, Vec<DirEntry>> = HashMap::new();
        let mut pending = vec![args.path.clone()];
        while let Some(dir) = pending.pop() {
            if listings.contains_key(&dir) {
                continue;
            }
            let entries = match list_dir(&self.gh, &args.repo, &dir, &branch).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(path = %dir, error = %e, "Error in recursive listing");
                    Vec::new()
                }
            };
            for entry in entries.iter().rev().filter(|e| e.kind == "dir") {
                pending.push(entry.path.clone());
            }
            listings.insert(dir, entries);
        }

        let mut dirs: Vec<String> = listings.keys().cloned().collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(depth(d)));

        let mut built: HashMap<String, Vec<Value>> = HashMap::new();
        for dir in dirs {
            let entries = listings.remove(&dir).unwrap_or_default();
            let nodes = entries
                .into_iter()
                .map(|e| {
                    if e.kind == "dir" {
                        let contents = built.remove(&e.path).unwrap_or_default();
                        json!({"name": e.name, "type": "dir", "path": e.path, "contents": contents})
                    } else {
                        json!({"name": e.name, "type": "file", "path": e.path})
                    }
                })
                .collect();
            built.insert(dir, nodes);
        }

        let tree = built.remove(&args.path).unwrap_or_default();
        tracing::info!("Recursive listing completed");
        Ok(Value::Array(tree).to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteFileArgs {
    /// Repository name in format 'owner/repo'
    pub repo: String,
    /// Exact file path relative to the repository root
    pub path: String,
    /// Commit message for the deletion
    #[serde(default = "default_delete_message")]
    pub commit_message: String,
    /// Branch to delete from, defaults to the repository's default branch
    pub branch: Option<String>,
}

fn default_delete_message() -> String {
    "Delete file".to_string()
}

/// 删除文件（破坏性操作，需确认）
pub struct DeleteFileTool {
    gh: Arc<GitHubClient>,
}

impl DeleteFileTool {
    pub fn new(gh: Arc<GitHubClient>) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from a GitHub repository. WARNING: This is a destructive operation that requires \
         user confirmation. Use get_file_content first to verify the file exists."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DeleteFileArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: DeleteFileArgs = parse_args(args)?;
        let branch = branch_or_default(&self.gh, &args.repo, args.branch)
            .await
            .map_err(|e| format!("Error deleting file: {}", e.diagnostic()))?;
        tracing::info!(repo = %args.repo, path = %args.path, branch = %branch, "Deleting file");

        let url = contents_url(&self.gh, &args.repo, &args.path);
        let sha = match self.gh.get_json(&url, &[("ref", branch.clone())]).await {
            Ok(data) => data
                .get("sha")
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| format!("Error deleting file: '{}' has no sha", args.path))?,
            Err(e) if e.is_not_found() => {
                return Err(format!(
                    "Error: File '{}' not found in repository '{}' on branch '{}'",
                    args.path, args.repo, branch
                ))
            }
            Err(e) => return Err(format!("Error deleting file: {}", e.diagnostic())),
        };

        let body = json!({"message": args.commit_message, "sha": sha, "branch": branch});
        match self.gh.request(Method::DELETE, &url, Some(&body), &[]).await {
            Ok(_) => {
                tracing::info!(path = %args.path, "File deleted");
                Ok("File deleted successfully".to_string())
            }
            Err(e) if e.is_not_found() => Err(format!(
                "Error: Unable to delete file (404). This typically indicates:\n\
                 \x20 - Insufficient repository permissions (needs 'push' access)\n\
                 \x20 - GitHub token authentication issue\n\
                 \x20 - File may have been deleted by another process\n\
                 Original error: {}",
                e
            )),
            Err(e) if e.status() == Some(409) => Err(
                "Error: File deletion conflict. The file may have been modified since you last accessed it."
                    .to_string(),
            ),
            Err(e) => Err(format!("Error deleting file: {}", e.diagnostic())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_file_summary_shows_head_and_tail() {
        let raw: String = (1..=100).map(|i| format!("line {}\n", i)).collect();
        let s = summarize_large_file("src/big.rs", raw.trim_end(), 2_000_000);
        assert!(s.contains("**Total Lines:** 100"));
        assert!(s.contains("line 50\n```"));
        assert!(s.contains("30 lines omitted"));
        assert!(s.contains("line 81"));
        assert!(s.contains("**File Type:** rs"));
    }

    #[test]
    fn test_short_file_summary_has_no_tail() {
        let s = summarize_large_file("Makefile", "a\nb\nc", 10);
        assert!(!s.contains("Last 20 lines"));
        assert!(s.contains("**File Type:** Unknown"));
    }

    #[test]
    fn test_depth_counts_segments() {
        assert_eq!(depth(""), 0);
        assert_eq!(depth("src"), 1);
        assert_eq!(depth("src/tools/mod.rs"), 3);
    }
}
