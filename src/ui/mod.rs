//! 终端交互层：行式输入、确认与评审决策提示、原地更新的进度行

pub mod console;
pub mod progress;
pub mod prompt;

pub use console::Console;
pub use progress::ConsoleProgress;
pub use prompt::{parse_failure_choice, parse_yes_no, ConsolePrompt};
