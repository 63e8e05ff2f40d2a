//! 共享的标准输入读取器
//!
//! REPL 与确认提示共用同一个行缓冲；只在等待输入时持锁。

use std::io::Write;

use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub struct Console {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Console {
    pub fn stdin() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(stdin()).lines()),
        }
    }

    /// 打印提示并读取一行；EOF 时返回 None
    pub async fn read_line(&self, prompt: &str) -> std::io::Result<Option<String>> {
        let mut out = std::io::stdout();
        write!(out, "{}", prompt)?;
        out.flush()?;
        let mut lines = self.lines.lock().await;
        lines.next_line().await
    }

    pub fn say(&self, text: &str) {
        println!("{}", text);
    }
}
