//! 破坏性操作确认与进度展示的协作接口
//!
//! 删除文件、创建仓库需用户同步确认；拒绝时工具不会被调用。

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

/// 需要确认的工具
pub const DESTRUCTIVE_TOOLS: &[&str] = &["delete_file", "create_repository"];

/// 拒绝确认时的固定工具结果
pub const CANCELLED_BY_USER: &str = "Operation cancelled by user";

pub fn is_destructive(name: &str) -> bool {
    DESTRUCTIVE_TOOLS.contains(&name)
}

/// 用户直接回车时的默认答案：删除默认否，建仓默认是
pub fn default_answer(operation: &str) -> bool {
    operation != "delete_file"
}

/// 确认面板文本
pub fn confirmation_details(operation: &str, args: &Value) -> String {
    let field = |key: &str| {
        args.get(key)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    match operation {
        "delete_file" => format!(
            "DESTRUCTIVE OPERATION\n\nYou are about to delete:\n  Repository: {}\n  File: {}\n\nThis action cannot be undone.",
            field("repo"),
            field("path")
        ),
        "create_repository" => {
            let private = args.get("private").and_then(Value::as_bool).unwrap_or(false);
            format!(
                "REPOSITORY CREATION\n\nCreating new repository:\n  Name: {}\n  Visibility: {}",
                field("name"),
                if private { "Private" } else { "Public" }
            )
        }
        other => format!("Run {}?", other),
    }
}

/// 同步 yes/no 确认
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn ask(&self, operation: &str, details: &str) -> bool;
}

/// 固定答案（非交互场景与测试）
#[derive(Debug)]
pub struct StaticConfirmer {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl StaticConfirmer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// 被询问过的操作名
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Confirmer for StaticConfirmer {
    async fn ask(&self, operation: &str, _details: &str) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(operation.to_string());
        }
        self.answer
    }
}

/// 进度展示：show 原地更新当前行，finish 固定最终结果
pub trait ProgressSink: Send + Sync {
    fn show(&self, text: &str);

    fn finish(&self, text: &str);
}

/// 只记录到日志的进度实现
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn show(&self, text: &str) {
        tracing::debug!("{}", text);
    }

    fn finish(&self, text: &str) {
        tracing::debug!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_destructive_classification() {
        assert!(is_destructive("delete_file"));
        assert!(is_destructive("create_repository"));
        assert!(!is_destructive("get_file_content"));
        assert!(!default_answer("delete_file"));
        assert!(default_answer("create_repository"));
    }

    #[test]
    fn test_details_name_the_target() {
        let text = confirmation_details("delete_file", &json!({"repo": "o/r", "path": "src/lib.rs"}));
        assert!(text.contains("o/r"));
        assert!(text.contains("src/lib.rs"));
        let text = confirmation_details("create_repository", &json!({"name": "demo", "private": true}));
        assert!(text.contains("Private"));
    }
}
