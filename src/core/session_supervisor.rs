//! 会话监管：中断管理
//!
//! 每个用户轮次持有一个新的 CancellationToken；Ctrl+C 只取消当前轮，会话本身回到空闲等待下一条输入。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// 会话级取消管理：当前轮的取消令牌
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    current: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一轮：替换为新的 token 并返回其克隆
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        match self.current.lock() {
            Ok(mut guard) => *guard = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }
        token
    }

    /// 当前轮的 token（未开始任何轮次时为初始 token）
    pub fn cancel_token(&self) -> CancellationToken {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 触发取消（用户 Ctrl+C）
    pub fn cancel(&self) {
        self.cancel_token().cancel();
    }
}
