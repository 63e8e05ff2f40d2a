//! 核心层：错误类型、组件组装、会话监管（中断）

pub mod builder;
pub mod error;
pub mod session_supervisor;

pub use builder::{create_llm_from_config, AgentBuilder, AgentComponents};
pub use error::AgentError;
pub use session_supervisor::SessionSupervisor;
