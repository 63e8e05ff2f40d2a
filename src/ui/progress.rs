//! 工具执行进度：执行中原地刷新同一行，完成后固定为一行摘要

use std::io::Write;

use crate::tools::ProgressSink;

/// 清除当前行
const CLEAR_LINE: &str = "\r\x1b[2K";

#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn show(&self, text: &str) {
        let mut out = std::io::stdout();
        let _ = write!(out, "{}⏳ {}", CLEAR_LINE, text);
        let _ = out.flush();
    }

    fn finish(&self, text: &str) {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{}✓ {}", CLEAR_LINE, text);
        let _ = out.flush();
    }
}
