//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GITBEE__*` 覆盖（双下划线表示嵌套，如 `GITBEE__PEER_REVIEW__ENABLED=true`）。
//! 凭据未写入配置时回退到常规环境变量 `XAI_API_KEY` / `GITHUB_TOKEN` / `GITHUB_USERNAME`。
//!
//! 核心逻辑只接收 `&AppConfig` 快照；`ConfigHandle` 负责在每轮开始时重新读取（配置热更新）。

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub github: GitHubSection,
    pub agent: AgentSection,
    pub peer_review: PeerReviewSection,
}

/// [llm] 段：模型端点（OpenAI 兼容）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "grok-4-0709".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.x.ai/v1".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_llm_base_url(),
            api_key: None,
        }
    }
}

/// [github] 段：托管 API 地址、版本头、超时与限流参数
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_github_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_github_api_version")]
    pub api_version: String,
    pub token: Option<String>,
    pub username: Option<String>,
    /// 单次 HTTP 请求超时（秒）；模型调用不设超时
    #[serde(default = "default_github_timeout_secs")]
    pub timeout_secs: u64,
    /// 403 限流时的最大重试次数
    #[serde(default = "default_github_max_retries")]
    pub max_retries: u32,
    /// x-ratelimit-remaining 低于此值时告警
    #[serde(default = "default_rate_limit_low_water")]
    pub rate_limit_low_water: u64,
    /// 超过此大小的文件只返回摘要
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_github_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_github_timeout_secs() -> u64 {
    30
}

fn default_github_max_retries() -> u32 {
    3
}

fn default_rate_limit_low_water() -> u64 {
    100
}

fn default_max_file_size_mb() -> u64 {
    1
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_base_url: default_github_api_base_url(),
            api_version: default_github_api_version(),
            token: None,
            username: None,
            timeout_secs: default_github_timeout_secs(),
            max_retries: default_github_max_retries(),
            rate_limit_low_water: default_rate_limit_low_water(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

/// [agent] 段：工具轮数上限与空回复恢复
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单轮用户输入内最多执行多少批工具调用，防止失控的调用链
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_true")]
    pub empty_response_recovery: bool,
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: usize,
}

fn default_max_tool_rounds() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_max_recovery_attempts() -> usize {
    2
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            empty_response_recovery: true,
            max_recovery_attempts: default_max_recovery_attempts(),
        }
    }
}

/// 评审 Agent 自身失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewFailurePolicy {
    /// 直接放行（Approve），记录为降级路径
    #[default]
    FailOpen,
    /// 交给用户选择 approve / retry / cancel
    Ask,
}

/// [peer_review] 段：PR 提交前的第二 Agent 评审
#[derive(Debug, Clone, Deserialize)]
pub struct PeerReviewSection {
    #[serde(default)]
    pub enabled: bool,
    /// 评审模型，未设置时沿用 llm.model
    pub model: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_review_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub on_failure: ReviewFailurePolicy,
}

fn default_max_iterations() -> usize {
    3
}

fn default_review_temperature() -> f32 {
    0.3
}

impl Default for PeerReviewSection {
    fn default() -> Self {
        Self {
            enabled: false,
            model: None,
            max_iterations: default_max_iterations(),
            temperature: default_review_temperature(),
            on_failure: ReviewFailurePolicy::FailOpen,
        }
    }
}

impl AppConfig {
    /// LLM API Key：配置优先，其次 XAI_API_KEY
    pub fn llm_api_key(&self) -> Option<String> {
        non_empty(self.llm.api_key.clone()).or_else(|| env_non_empty("XAI_API_KEY"))
    }

    /// GitHub Token：配置优先，其次 GITHUB_TOKEN
    pub fn github_token(&self) -> Option<String> {
        non_empty(self.github.token.clone()).or_else(|| env_non_empty("GITHUB_TOKEN"))
    }

    pub fn github_username(&self) -> Option<String> {
        non_empty(self.github.username.clone()).or_else(|| env_non_empty("GITHUB_USERNAME"))
    }

    /// 评审模型名
    pub fn review_model(&self) -> &str {
        self.peer_review.model.as_deref().unwrap_or(&self.llm.model)
    }

    /// 缺失的必需凭据（以环境变量名列出，便于提示用户）
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.llm_api_key().is_none() {
            missing.push("XAI_API_KEY");
        }
        if self.github_token().is_none() {
            missing.push("GITHUB_TOKEN");
        }
        if self.github_username().is_none() {
            missing.push("GITHUB_USERNAME");
        }
        missing
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_non_empty(key: &str) -> Option<String> {
    non_empty(std::env::var(key).ok())
}

/// 从 config 目录加载配置，环境变量 GITBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GITBEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GITBEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 可热更新的配置提供者：每次 `current()` 重新读取磁盘与环境变量，失败时沿用上一份快照。
///
/// 命令行覆盖项（如 `--model`）在每次重新加载后重新应用。
pub struct ConfigHandle {
    config_path: Option<PathBuf>,
    model_override: Option<String>,
    last: RwLock<Arc<AppConfig>>,
}

impl ConfigHandle {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let cfg = load_config(config_path.clone())?;
        Ok(Self {
            config_path,
            model_override: None,
            last: RwLock::new(Arc::new(cfg)),
        })
    }

    /// 固定快照（测试或无需热更新的场景）
    pub fn fixed(cfg: AppConfig) -> Self {
        Self {
            config_path: None,
            model_override: None,
            last: RwLock::new(Arc::new(cfg)),
        }
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        if let Some(model) = self.model_override.clone() {
            if let Ok(mut last) = self.last.write() {
                let mut cfg = (**last).clone();
                cfg.llm.model = model;
                *last = Arc::new(cfg);
            }
        }
        self
    }

    /// 重新加载并返回最新快照
    pub fn current(&self) -> Arc<AppConfig> {
        match load_config(self.config_path.clone()) {
            Ok(mut cfg) => {
                if let Some(model) = &self.model_override {
                    cfg.llm.model = model.clone();
                }
                let cfg = Arc::new(cfg);
                if let Ok(mut last) = self.last.write() {
                    *last = cfg.clone();
                }
                cfg
            }
            Err(e) => {
                tracing::warn!("Config reload failed ({}), keeping previous snapshot", e);
                self.snapshot()
            }
        }
    }

    /// 上一次成功加载的快照（不触发重新读取）
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.last
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}
