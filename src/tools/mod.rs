pub mod commits;
pub mod confirm;
pub mod contents;
pub mod dispatcher;
pub mod issues;
pub mod pulls;
pub mod registry;
pub mod repos;
pub mod review_tools;
pub mod schema;
pub mod summary;

use std::sync::Arc;

pub use commits::{CompareCommitsTool, GetCommitDetailsTool, GetCommitDiffTool, GetCommitHistoryTool};
pub use confirm::{Confirmer, LogProgress, ProgressSink, StaticConfirmer, CANCELLED_BY_USER};
pub use contents::{DeleteFileTool, GetFileContentTool, ListDirectoryContentsTool, RecursiveListDirectoryTool};
pub use dispatcher::{ToolDispatcher, ToolError, ToolScope};
pub use issues::{AddIssueCommentTool, ManageIssuesTool};
pub use pulls::{
    submit_pull_request, ApprovePullRequestTool, CreatePullRequestArgs, CreatePullRequestTool,
    IteratePullRequestArgs, IteratePullRequestTool, MergePullRequestTool, PullRequestDraftArgs,
};
pub use registry::{Tool, ToolRegistry};
pub use repos::{
    CreateRepositoryTool, GetRepoInfoTool, ListGithubReposTool, ListRepoBranchesTool,
    SearchGithubReposTool,
};
pub use review_tools::{RequestPrChangesTool, ReviewPullRequestTool};

use crate::config::AppConfig;
use crate::github::GitHubClient;

/// 注册全部 GitHub 工具（静态工具目录）
pub fn build_registry(gh: Arc<GitHubClient>, cfg: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ListGithubReposTool::new(gh.clone()));
    registry.register(SearchGithubReposTool::new(gh.clone(), cfg.github_username()));
    registry.register(GetRepoInfoTool::new(gh.clone()));
    registry.register(ListRepoBranchesTool::new(gh.clone()));
    registry.register(CreateRepositoryTool::new(gh.clone()));

    registry.register(GetFileContentTool::new(gh.clone(), cfg.github.max_file_size_mb));
    registry.register(ListDirectoryContentsTool::new(gh.clone()));
    registry.register(RecursiveListDirectoryTool::new(gh.clone()));
    registry.register(DeleteFileTool::new(gh.clone()));

    registry.register(GetCommitHistoryTool::new(gh.clone()));
    registry.register(GetCommitDetailsTool::new(gh.clone()));
    registry.register(GetCommitDiffTool::new(gh.clone()));
    registry.register(CompareCommitsTool::new(gh.clone()));

    registry.register(ManageIssuesTool::new(gh.clone()));
    registry.register(AddIssueCommentTool::new(gh.clone()));

    registry.register(CreatePullRequestTool::new(gh.clone()));
    registry.register(ApprovePullRequestTool::new(gh.clone()));
    registry.register(IteratePullRequestTool);
    registry.register(MergePullRequestTool::new(gh));
    registry.register(ReviewPullRequestTool);
    registry.register(RequestPrChangesTool);

    tracing::info!(tools = registry.len(), "Tool registry built");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_catalog_and_read_only_subset() {
        let gh = Arc::new(GitHubClient::from_config(&AppConfig::default()).unwrap());
        let registry = build_registry(gh, &AppConfig::default());
        assert_eq!(registry.len(), 21);

        let read_only: Vec<String> = registry.specs(true).into_iter().map(|s| s.name).collect();
        assert!(read_only.contains(&"get_file_content".to_string()));
        assert!(read_only.contains(&"compare_commits".to_string()));
        assert!(!read_only.contains(&"delete_file".to_string()));
        assert!(!read_only.contains(&"create_pull_request".to_string()));
        assert!(!read_only.contains(&"review_pull_request".to_string()));

        for spec in registry.specs(false) {
            assert_eq!(spec.parameters["type"], "object", "{}", spec.name);
        }
    }
}
