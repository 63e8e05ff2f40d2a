//! Agent 构建器：统一组装 GitHub 客户端、工具目录、分发器、LLM、同行评审与主会话
//!
//! 交互式入口注入终端的确认与进度实现；测试注入 ScriptedLlmClient 与固定答案。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::github::GitHubClient;
use crate::llm::{LlmClient, OpenAiClient};
use crate::review::{PeerReviewAgent, PeerReviewOrchestrator, ReviewPrompt, StaticReviewPrompt};
use crate::session::{PrReviewGate, ToolCallingSession};
use crate::tools::{build_registry, Confirmer, LogProgress, ProgressSink, StaticConfirmer, ToolDispatcher};

/// 根据配置创建 OpenAI 兼容的 LLM 客户端；缺少 API Key 时报配置错误
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let api_key = cfg
        .llm_api_key()
        .ok_or_else(|| AgentError::ConfigError("XAI_API_KEY is not set".to_string()))?;
    tracing::info!(model = %cfg.llm.model, base_url = %cfg.llm.base_url, "Using OpenAI-compatible LLM");
    Ok(Arc::new(OpenAiClient::new(&cfg.llm.base_url, &api_key)))
}

/// 组装完成的共享组件
pub struct AgentComponents {
    pub github: Arc<GitHubClient>,
    pub llm: Arc<dyn LlmClient>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub orchestrator: Arc<PeerReviewOrchestrator>,
}

impl AgentComponents {
    /// 主会话（带 PR 评审闸门）
    pub fn main_session(&self) -> ToolCallingSession {
        ToolCallingSession::main(
            self.llm.clone(),
            self.dispatcher.clone(),
            PrReviewGate::new(self.orchestrator.clone()),
        )
    }
}

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    github: Option<Arc<GitHubClient>>,
    confirmer: Option<Arc<dyn Confirmer>>,
    progress: Option<Arc<dyn ProgressSink>>,
    review_prompt: Option<Arc<dyn ReviewPrompt>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            github: None,
            confirmer: None,
            progress: None,
            review_prompt: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_github(mut self, github: Arc<GitHubClient>) -> Self {
        self.github = Some(github);
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_review_prompt(mut self, prompt: Arc<dyn ReviewPrompt>) -> Self {
        self.review_prompt = Some(prompt);
        self
    }

    /// 未注入的部分：LLM 与 GitHub 客户端按配置创建，确认默认拒绝，评审到达上限默认不提交
    pub fn build(self) -> Result<AgentComponents, AgentError> {
        let github = match self.github {
            Some(gh) => gh,
            None => Arc::new(GitHubClient::from_config(&self.config)?),
        };
        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm_from_config(&self.config)?,
        };
        let confirmer = self
            .confirmer
            .unwrap_or_else(|| Arc::new(StaticConfirmer::new(false)));
        let progress = self.progress.unwrap_or_else(|| Arc::new(LogProgress));
        let review_prompt = self
            .review_prompt
            .unwrap_or_else(|| Arc::new(StaticReviewPrompt::new(false)));

        let registry = build_registry(github.clone(), &self.config);
        let dispatcher = Arc::new(ToolDispatcher::new(registry, confirmer, progress));
        let reviewer = Arc::new(PeerReviewAgent::new(llm.clone(), dispatcher.clone()));
        let orchestrator = Arc::new(PeerReviewOrchestrator::new(reviewer, review_prompt));

        tracing::info!(
            tools = dispatcher.tool_names().len(),
            peer_review = self.config.peer_review.enabled,
            "Agent components ready"
        );
        Ok(AgentComponents {
            github,
            llm,
            dispatcher,
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_missing_api_key_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key = Some("   ".into());
        if std::env::var("XAI_API_KEY").is_ok() {
            return;
        }
        let err = create_llm_from_config(&cfg).err().unwrap();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn test_build_with_injected_llm() {
        let components = AgentBuilder::new(AppConfig::default())
            .with_llm(Arc::new(ScriptedLlmClient::new()))
            .build()
            .unwrap();
        assert_eq!(components.dispatcher.tool_names().len(), 21);
        let session = components.main_session();
        assert!(session.gate().is_some());
    }
}
