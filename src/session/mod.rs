//! 工具调用会话：主 Agent 与评审 Agent 共用的有界工具循环、空回复恢复、PR 评审闸门

pub mod loop_;
pub mod prompts;
pub mod recovery;
pub mod review_gate;

pub use loop_::{SessionProfile, ToolCallingSession, TurnOutcome};
pub use recovery::{build_recovery_prompt, RecoveryController, RECOVERY_MARKER};
pub use review_gate::PrReviewGate;
