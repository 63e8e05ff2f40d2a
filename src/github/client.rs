//! 带限流重试与分页聚合的 GitHub REST 客户端
//!
//! - `make_request`：403 且响应体提示 rate limit 时，按 `x-ratelimit-reset` 计算等待秒数后重试，最多 max_retries 次
//! - `get_paginated`：per_page 固定 100，支持裸数组与 `{items, total_count}` 两种格式，中途失败返回已累积结果
//! - `get_default_branch`：缺少字段时返回 "main"，失败包装为 DefaultBranch 错误

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde_json::Value;

use crate::config::AppConfig;
use crate::github::{Clock, GitHubError, SystemClock};

/// 分页大小（GitHub 允许的最大值）
pub const PER_PAGE: usize = 100;

/// 默认最大页数
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// 客户端设置（从 AppConfig 的 [github] 段取得）
#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_base_url: String,
    pub api_version: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub rate_limit_low_water: u64,
}

impl GitHubSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            api_base_url: cfg.github.api_base_url.clone(),
            api_version: cfg.github.api_version.clone(),
            token: cfg.github_token(),
            timeout_secs: cfg.github.timeout_secs,
            max_retries: cfg.github.max_retries,
            rate_limit_low_water: cfg.github.rate_limit_low_water,
        }
    }
}

/// 一次成功（2xx）的响应
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl ApiResponse {
    pub fn json(&self) -> Result<Value, GitHubError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body).map_err(|e| GitHubError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

pub struct GitHubClient {
    http: reqwest::Client,
    settings: GitHubSettings,
    clock: Arc<dyn Clock>,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("gitbee"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_str(&settings.api_version)
                .map_err(|e| GitHubError::Config(e.to_string()))?,
        );
        if let Some(token) = &settings.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| GitHubError::Config(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GitHubError::Config(e.to_string()))?;

        tracing::info!(base_url = %settings.api_base_url, "GitHub API client initialized");
        Ok(Self {
            http,
            settings,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, GitHubError> {
        Self::new(GitHubSettings::from_config(cfg))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &GitHubSettings {
        &self.settings
    }

    /// 拼接 API 地址：`api_url("repos/o/r")` → `{base}/repos/o/r`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// 使用配置中的 max_retries 发起请求
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        params: &[(&str, String)],
    ) -> Result<ApiResponse, GitHubError> {
        self.make_request(method, url, body, params, self.settings.max_retries)
            .await
    }

    /// 发起请求；仅限流 403 会重试，等待 `max(1, reset - now)` 秒
    pub async fn make_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        params: &[(&str, String)],
        max_retries: u32,
    ) -> Result<ApiResponse, GitHubError> {
        self.send_with_retry(method, url, body, params, None, max_retries)
            .await
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        params: &[(&str, String)],
        accept: Option<&str>,
        max_retries: u32,
    ) -> Result<ApiResponse, GitHubError> {
        let mut attempt: u32 = 0;
        loop {
            let mut req = self.http.request(method.clone(), url);
            if !params.is_empty() {
                req = req.query(params);
            }
            if let Some(accept) = accept {
                req = req.header(ACCEPT, accept);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req.send().await.map_err(|e| {
                tracing::error!(method = %method, url, error = %e, "GitHub API request failed");
                GitHubError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            })?;

            let status = resp.status().as_u16();
            let remaining = header_number::<u64>(resp.headers(), "x-ratelimit-remaining");
            let reset = header_number::<i64>(resp.headers(), "x-ratelimit-reset");

            if let Some(remaining) = remaining {
                tracing::debug!(remaining, "GitHub API rate limit remaining");
                if remaining < self.settings.rate_limit_low_water {
                    tracing::warn!(
                        remaining,
                        "GitHub API rate limit running low: {} requests remaining",
                        remaining
                    );
                }
            }

            let text = resp.text().await.map_err(|e| GitHubError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            if (200..300).contains(&status) {
                return Ok(ApiResponse {
                    status,
                    url: url.to_string(),
                    body: text,
                });
            }

            if status == 403 && text.to_lowercase().contains("rate limit") {
                if attempt < max_retries {
                    let delay = (reset.unwrap_or(0) - self.clock.now_epoch()).max(1) as u64;
                    attempt += 1;
                    tracing::warn!(
                        url,
                        delay_secs = delay,
                        "Rate limit exceeded. Retrying in {} seconds... (attempt {}/{})",
                        delay,
                        attempt,
                        max_retries
                    );
                    self.clock.sleep(delay).await;
                    continue;
                }
                tracing::error!(url, "Rate limit exceeded and max retries reached");
                return Err(GitHubError::RateLimited {
                    url: url.to_string(),
                    retries: max_retries,
                });
            }

            tracing::error!(method = %method, url, status, "GitHub API request failed");
            return Err(GitHubError::from_status(method.as_str(), url, status, &text));
        }
    }

    /// GET 并解析 JSON
    pub async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, GitHubError> {
        self.request(Method::GET, url, None, params).await?.json()
    }

    /// 以指定 media type 读取文本（diff / raw 内容）
    pub async fn get_text(
        &self,
        url: &str,
        params: &[(&str, String)],
        accept: &str,
    ) -> Result<String, GitHubError> {
        let resp = self
            .send_with_retry(
                Method::GET,
                url,
                None,
                params,
                Some(accept),
                self.settings.max_retries,
            )
            .await?;
        Ok(resp.body)
    }

    /// 聚合分页结果；任何一页失败即停止并返回已取得的条目
    pub async fn get_paginated(
        &self,
        url: &str,
        params: &[(&str, String)],
        max_pages: u32,
    ) -> Vec<Value> {
        let mut all_items: Vec<Value> = Vec::new();
        let mut page: u32 = 1;

        while page <= max_pages {
            let mut query: Vec<(&str, String)> = params
                .iter()
                .filter(|(k, _)| *k != "page" && *k != "per_page")
                .cloned()
                .collect();
            query.push(("per_page", PER_PAGE.to_string()));
            query.push(("page", page.to_string()));

            let value = match self.get_json(url, &query).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(page, error = %e, "Error fetching page, returning partial results");
                    break;
                }
            };

            let (page_items, total_count) = match value {
                Value::Array(items) => (items, None),
                Value::Object(mut map) if map.contains_key("items") => {
                    let total = map.get("total_count").and_then(Value::as_u64);
                    let items = match map.remove("items") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    };
                    (items, total)
                }
                _ => {
                    tracing::warn!(page, url, "Unexpected page shape, stopping pagination");
                    break;
                }
            };

            if page_items.is_empty() {
                break;
            }
            let fetched = page_items.len();
            all_items.extend(page_items);

            if fetched < PER_PAGE {
                break;
            }
            if let Some(total) = total_count {
                if all_items.len() as u64 >= total {
                    break;
                }
            }
            page += 1;
        }

        tracing::debug!(items = all_items.len(), "Pagination finished");
        all_items
    }

    /// 仓库默认分支；响应缺少该字段时为 "main"
    pub async fn get_default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        let url = self.api_url(&format!("repos/{}", repo));
        let data = self
            .get_json(&url, &[])
            .await
            .map_err(|e| GitHubError::DefaultBranch {
                repo: repo.to_string(),
                source: Box::new(e),
            })?;
        let branch = data
            .get("default_branch")
            .and_then(Value::as_str)
            .unwrap_or("main")
            .to_string();
        tracing::debug!(repo, branch = %branch, "Default branch resolved");
        Ok(branch)
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
