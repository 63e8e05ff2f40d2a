//! GitBee - Rust GitHub 智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与热更新
//! - **core**: 错误类型、组件组装、会话监管
//! - **github**: 限流感知的 GitHub REST 客户端（重试、分页、默认分支）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Scripted）
//! - **memory**: 对话 Transcript
//! - **review**: PR 提交前的同行评审（评审 Agent、结论解析、多轮编排）
//! - **session**: 工具调用会话循环、空回复恢复、PR 评审闸门
//! - **tools**: GitHub 工具目录、参数校验、分发与破坏性操作确认
//! - **ui**: 终端交互（行输入、确认提示、进度行）

pub mod config;
pub mod core;
pub mod github;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod review;
pub mod session;
pub mod tools;
pub mod ui;
