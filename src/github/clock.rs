//! 限流退避使用的时钟，测试中可替换为不真正休眠的实现

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Clock: Send + Sync {
    /// 当前 Unix 时间（秒）
    fn now_epoch(&self) -> i64;

    async fn sleep(&self, secs: u64);
}

#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn sleep(&self, secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

/// 固定时间、只记录休眠时长的时钟
#[derive(Debug)]
pub struct RecordingClock {
    now: i64,
    sleeps: Mutex<Vec<u64>>,
}

impl RecordingClock {
    pub fn at(now: i64) -> Self {
        Self {
            now,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now_epoch(&self) -> i64 {
        self.now
    }

    async fn sleep(&self, secs: u64) {
        if let Ok(mut s) = self.sleeps.lock() {
            s.push(secs);
        }
    }
}
