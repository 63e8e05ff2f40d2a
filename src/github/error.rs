//! GitHub API 错误
//!
//! 只有限流 403 会被重试；其余 4xx/5xx 立即向上传播。面向用户的诊断通过 `likely_causes` 给出可能原因。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{method} {url} returned HTTP {status}: {message}")]
    Status {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("authorization failed (HTTP {status}) for {url}: {message}")]
    Authorization {
        url: String,
        status: u16,
        message: String,
    },

    #[error("not found (HTTP 404): {url}")]
    NotFound { url: String, message: String },

    #[error("rate limit exceeded for {url} after {retries} retries")]
    RateLimited { url: String, retries: u32 },

    #[error("Error fetching default branch for {repo}: {source}")]
    DefaultBranch {
        repo: String,
        #[source]
        source: Box<GitHubError>,
    },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl GitHubError {
    /// 按 HTTP 状态码归类非 2xx 响应
    pub fn from_status(method: &str, url: &str, status: u16, body: &str) -> Self {
        let message = api_message(body);
        match status {
            401 | 403 => GitHubError::Authorization {
                url: url.to_string(),
                status,
                message,
            },
            404 => GitHubError::NotFound {
                url: url.to_string(),
                message,
            },
            _ => GitHubError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status,
                message,
            },
        }
    }

    /// HTTP 状态码（若有）；DefaultBranch 取其内部错误的状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Status { status, .. } | GitHubError::Authorization { status, .. } => {
                Some(*status)
            }
            GitHubError::NotFound { .. } => Some(404),
            GitHubError::RateLimited { .. } => Some(403),
            GitHubError::DefaultBranch { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 可能原因（权限 / 认证 / 限流 / 不存在）
    pub fn likely_causes(&self) -> Vec<&'static str> {
        match self {
            GitHubError::Authorization { .. } => vec![
                "GitHub token may be expired or invalid",
                "Token lacks the required scope (needs 'repo' / 'contents:write')",
                "Insufficient repository permissions (needs 'push' access)",
            ],
            GitHubError::NotFound { .. } => vec![
                "Repository or path name is incorrect",
                "GitHub token has no access to this repository",
                "Repository is private and the token lacks access",
            ],
            GitHubError::RateLimited { .. } => vec![
                "GitHub API rate limit exhausted; wait for the reset window",
                "Use an authenticated token with a higher rate limit",
            ],
            GitHubError::Transport { .. } => vec![
                "Network connectivity issues",
                "GitHub API temporarily unavailable",
            ],
            GitHubError::DefaultBranch { source, .. } => source.likely_causes(),
            _ => Vec::new(),
        }
    }

    /// 错误文本加可能原因列表（供工具结果与终端输出）
    pub fn diagnostic(&self) -> String {
        let causes = self.likely_causes();
        if causes.is_empty() {
            return self.to_string();
        }
        let mut out = format!("{}\nThis typically indicates:", self);
        for cause in causes {
            out.push_str("\n  - ");
            out.push_str(cause);
        }
        out
    }
}

/// GitHub 错误响应体通常为 {"message": "..."}，否则截取原文
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let e = GitHubError::from_status("GET", "u", 404, r#"{"message":"Not Found"}"#);
        assert!(e.is_not_found());
        let e = GitHubError::from_status("GET", "u", 401, "Bad credentials");
        assert!(matches!(e, GitHubError::Authorization { status: 401, .. }));
        let e = GitHubError::from_status("POST", "u", 422, r#"{"message":"Reference already exists"}"#);
        assert_eq!(e.status(), Some(422));
        assert!(e.to_string().contains("Reference already exists"));
    }

    #[test]
    fn test_default_branch_wrapper_keeps_cause() {
        let inner = GitHubError::from_status("GET", "u", 404, "");
        let e = GitHubError::DefaultBranch {
            repo: "octo/demo".into(),
            source: Box::new(inner),
        };
        assert!(e.to_string().contains("octo/demo"));
        assert!(e.is_not_found());
        assert!(e.diagnostic().contains("Repository or path name is incorrect"));
    }
}
