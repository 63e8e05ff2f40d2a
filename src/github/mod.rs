//! GitHub 托管 API 层：限流感知的 HTTP 客户端、分页聚合、错误诊断

pub mod client;
pub mod clock;
pub mod error;

pub use client::{ApiResponse, GitHubClient, GitHubSettings, DEFAULT_MAX_PAGES, PER_PAGE};
pub use clock::{Clock, RecordingClock, SystemClock};
pub use error::GitHubError;
