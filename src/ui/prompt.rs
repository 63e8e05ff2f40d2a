//! 终端上的同步决策：破坏性操作确认、评审达到上限后的提交确认、评审失败时的处理选择

use std::sync::Arc;

use async_trait::async_trait;

use crate::review::{FailureChoice, PeerReviewContext, ReviewPrompt, ReviewVerdict};
use crate::tools::confirm::default_answer;
use crate::tools::Confirmer;
use crate::ui::Console;

/// 解析 y/n 回答；空输入取默认值，无法识别时视为否
pub fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// 解析 approve / retry / cancel；无法识别时取消
pub fn parse_failure_choice(answer: &str) -> FailureChoice {
    match answer.trim().to_lowercase().as_str() {
        "a" | "approve" => FailureChoice::Approve,
        "r" | "retry" => FailureChoice::Retry,
        _ => FailureChoice::Cancel,
    }
}

pub struct ConsolePrompt {
    console: Arc<Console>,
}

impl ConsolePrompt {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }

    async fn ask_line(&self, prompt: &str) -> Option<String> {
        match self.console.read_line(prompt).await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read answer from stdin");
                None
            }
        }
    }
}

#[async_trait]
impl Confirmer for ConsolePrompt {
    async fn ask(&self, operation: &str, details: &str) -> bool {
        let default = default_answer(operation);
        self.console.say(&format!("\n{}\n", details));
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.ask_line(&format!("Proceed? {} ", hint)).await;
        // EOF 视为拒绝
        answer.map(|a| parse_yes_no(&a, default)).unwrap_or(false)
    }
}

#[async_trait]
impl ReviewPrompt for ConsolePrompt {
    async fn final_decision(&self, ctx: &PeerReviewContext) -> bool {
        self.console.say(&format!(
            "\nPeer review reached the maximum of {} iteration(s) for '{}' without approval.",
            ctx.current_iteration, ctx.draft.title
        ));
        if let Some(last) = ctx.last_record() {
            self.console.say(&format!("Last feedback: {}", last.feedback));
        }
        self.ask_line("Submit the pull request anyway? [y/N] ")
            .await
            .map(|a| parse_yes_no(&a, false))
            .unwrap_or(false)
    }

    async fn on_review_failure(&self, error: &str) -> FailureChoice {
        self.console
            .say(&format!("\nPeer review failed: {}", error));
        self.ask_line("[a]pprove without review / [r]etry / [c]ancel: ")
            .await
            .map(|a| parse_failure_choice(&a))
            .unwrap_or(FailureChoice::Cancel)
    }

    fn show_verdict(&self, verdict: &ReviewVerdict, iteration: usize) {
        self.console.say(&format!(
            "\n🔍 Peer review iteration {}: {}\n{}",
            iteration, verdict.decision, verdict.feedback
        ));
        for s in &verdict.suggestions {
            self.console.say(&format!("  - {}", s));
        }
    }
}
