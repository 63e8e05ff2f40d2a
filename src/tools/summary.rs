//! 工具执行摘要：由 (工具名, 结果文本, 原始参数) 生成一行简短状态，供进度行展示
//!
//! 纯函数，永不失败；无法提取信息时回退为 "Completed"。

use serde_json::Value;

pub const GENERIC_SUMMARY: &str = "Completed";

pub fn summarize(tool: &str, result: &str, args: &Value) -> String {
    try_summarize(tool, result, args).unwrap_or_else(|| GENERIC_SUMMARY.to_string())
}

fn try_summarize(tool: &str, result: &str, args: &Value) -> Option<String> {
    let arg = |key: &str| args.get(key).and_then(Value::as_str);
    let count = || serde_json::from_str::<Value>(result).ok()?.as_array().map(Vec::len);

    let line = match tool {
        "list_github_repos" => match count() {
            Some(n) => format!("Found {} repositories", n),
            None => "Listed repositories".to_string(),
        },
        "search_github_repos" => {
            let query = arg("query").unwrap_or("");
            match count() {
                Some(n) => format!("Found {} repos for '{}'", n, query),
                None => format!("Searched for '{}'", query),
            }
        }
        "get_repo_info" => format!("Got info for {}", arg("repo").unwrap_or("repository")),
        "list_repo_branches" => {
            let repo = arg("repo").unwrap_or("repository");
            format!("Found {} branches in {}", count()?, repo)
        }
        "list_directory_contents" | "recursive_list_directory" => {
            let repo = arg("repo").unwrap_or("");
            let path = arg("path").unwrap_or("");
            match count() {
                Some(n) => format!("Listed {} items in {}/{}", n, repo, path),
                None => format!("Listed directory {}/{}", repo, path),
            }
        }
        "get_commit_history" => {
            let repo = arg("repo").unwrap_or("repository");
            match count() {
                Some(n) => format!("Got {} commits from {}", n, repo),
                None => format!("Got commit history for {}", repo),
            }
        }
        "manage_issues" => {
            let repo = arg("repo").unwrap_or("repository");
            match arg("action").unwrap_or("managed") {
                "list" => match count() {
                    Some(n) => format!("Found {} issues in {}", n, repo),
                    None => format!("Listed issues in {}", repo),
                },
                action => format!("Issue {}d in {}", action, repo),
            }
        }
        "get_file_content" => format!(
            "Read {}/{}",
            arg("repo").unwrap_or(""),
            arg("path").unwrap_or("file")
        ),
        "create_pull_request" | "approve_pull_request" | "iterate_pull_request" => {
            format!("Created PR in {}", arg("repo").unwrap_or("repository"))
        }
        "delete_file" => format!("Deleted {}", arg("path")?),
        "create_repository" => format!("Created repository {}", arg("name")?),
        _ => return None,
    };
    Some(line)
}
