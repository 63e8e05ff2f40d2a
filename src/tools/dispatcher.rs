//! 工具分发器
//!
//! 解析 ToolCall 的 JSON 参数 → 查找工具 → 按 schema 校验 → 破坏性操作确认 → 执行 → 摘要与进度。
//! 所有分发层错误都转为工具结果文本返回给模型，不向会话抛出；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolSpec;
use crate::memory::ToolCall;
use crate::tools::confirm::{confirmation_details, is_destructive, CANCELLED_BY_USER};
use crate::tools::schema::validate_args;
use crate::tools::summary::summarize;
use crate::tools::{Confirmer, ProgressSink, Tool, ToolRegistry};

/// 分发层错误；Display 即写回 Transcript 的工具结果文本
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Error parsing tool arguments: {0}")]
    Argument(String),

    #[error("Invalid arguments for {tool}: {message}")]
    Validation { tool: String, message: String },

    #[error("Unknown function: {0}")]
    NotFound(String),

    #[error("Tool '{0}' is not available in this session")]
    NotPermitted(String),

    #[error("{}", CANCELLED_BY_USER)]
    Cancelled,

    #[error("Error executing {tool}: {message}")]
    Execution { tool: String, message: String },
}

/// 会话可见的工具范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolScope {
    All,
    /// 评审 Agent：仅只读工具
    ReadOnly,
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    confirmer: Arc<dyn Confirmer>,
    progress: Arc<dyn ProgressSink>,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        confirmer: Arc<dyn Confirmer>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            registry,
            confirmer,
            progress,
        }
    }

    pub fn catalog(&self, scope: ToolScope) -> Vec<ToolSpec> {
        self.registry.specs(scope == ToolScope::ReadOnly)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    fn lookup(&self, name: &str, scope: ToolScope) -> Result<Arc<dyn Tool>, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        if scope == ToolScope::ReadOnly && !tool.read_only() {
            return Err(ToolError::NotPermitted(name.to_string()));
        }
        Ok(tool)
    }

    /// 仅校验，不执行（会话拦截 PR 工具时使用）
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), ToolError> {
        let tool = self.lookup(name, ToolScope::All)?;
        validate_args(&tool.parameters_schema(), args).map_err(|message| ToolError::Validation {
            tool: name.to_string(),
            message,
        })
    }

    /// 分发一个模型发出的 ToolCall，返回工具结果文本
    pub async fn dispatch(&self, call: &ToolCall, scope: ToolScope) -> String {
        match parse_arguments(&call.arguments) {
            Ok(args) => self.dispatch_value(&call.name, args, scope).await,
            Err(e) => {
                tracing::error!(tool = %call.name, error = %e, "Tool argument parse failed");
                audit(&call.name, false, "bad_arguments", 0, &call.arguments);
                e.to_string()
            }
        }
    }

    /// 以已解析的参数对象分发
    pub async fn dispatch_value(&self, name: &str, args: Value, scope: ToolScope) -> String {
        let start = Instant::now();
        let preview = args_preview(&args);

        let result = self.run(name, args, scope).await;

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Execution { .. }) => (false, "error"),
            Err(ToolError::Cancelled) => (false, "cancelled"),
            Err(ToolError::NotFound(_)) => (false, "unknown_tool"),
            Err(ToolError::NotPermitted(_)) => (false, "not_permitted"),
            Err(_) => (false, "bad_arguments"),
        };
        audit(name, ok, outcome, start.elapsed().as_millis() as u64, &preview);

        match result {
            Ok(content) => content,
            Err(e) => {
                if !matches!(e, ToolError::Cancelled) {
                    tracing::warn!(tool = name, error = %e, "Tool call did not succeed");
                }
                e.to_string()
            }
        }
    }

    async fn run(&self, name: &str, args: Value, scope: ToolScope) -> Result<String, ToolError> {
        let tool = self.lookup(name, scope)?;
        validate_args(&tool.parameters_schema(), &args).map_err(|message| {
            ToolError::Validation {
                tool: name.to_string(),
                message,
            }
        })?;

        if is_destructive(name) {
            let details = confirmation_details(name, &args);
            if !self.confirmer.ask(name, &details).await {
                tracing::info!(tool = name, "Destructive operation declined by user");
                return Err(ToolError::Cancelled);
            }
        }

        let label = format!("Executing {:<25} ->", name);
        self.progress.show(&label);

        let summary_args = args.clone();
        match tool.execute(args).await {
            Ok(content) => {
                let summary = summarize(name, &content, &summary_args);
                self.progress.finish(&format!("{} {} ✅", label, summary));
                tracing::debug!(tool = name, result = %content, "Tool result");
                Ok(content)
            }
            Err(e) => {
                self.progress.finish(&format!("{} failed ❌", label));
                Err(ToolError::Execution {
                    tool: name.to_string(),
                    message: e,
                })
            }
        }
    }
}

/// 模型给出的参数字符串；空串视为无参数，必须是 JSON 对象
pub(crate) fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ToolError::Argument(e.to_string()))?;
    if !value.is_object() {
        return Err(ToolError::Argument("expected a JSON object".to_string()));
    }
    Ok(value)
}

fn audit(tool: &str, ok: bool, outcome: &str, duration_ms: u64, args_preview: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview,
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
