//! GitBee - 命令行入口
//!
//! 初始化日志与配置，组装组件后进入交互循环；`--config-test` 只做连通性检查。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use gitbee::config::{AppConfig, ConfigHandle};
use gitbee::core::{AgentBuilder, AgentComponents, AgentError, SessionSupervisor};
use gitbee::llm::ChatRequest;
use gitbee::memory::Message;
use gitbee::observability;
use gitbee::ui::{Console, ConsoleProgress, ConsolePrompt};

#[derive(Parser, Debug)]
#[command(name = "gitbee", version, about = "GitHub agent driven by natural language")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖 llm.model
    #[arg(short, long)]
    model: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// 检查 GitHub 与模型端点连通性后退出
    #[arg(long)]
    config_test: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init(&cli.log_level);

    let handle = ConfigHandle::new(cli.config.clone())
        .context("Failed to load configuration")?
        .with_model_override(cli.model.clone());
    let cfg = handle.snapshot();

    let missing = cfg.missing_required();
    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required environment variables: {}",
            missing.join(", ")
        );
    }

    let console = Arc::new(Console::stdin());
    let prompt = Arc::new(ConsolePrompt::new(console.clone()));
    let components = AgentBuilder::new((*cfg).clone())
        .with_confirmer(prompt.clone())
        .with_progress(Arc::new(ConsoleProgress))
        .with_review_prompt(prompt)
        .build()
        .context("Failed to initialize agent")?;

    if cli.config_test {
        return config_test(&components, &cfg).await;
    }

    run_repl(&components, &handle, &console).await
}

async fn run_repl(
    components: &AgentComponents,
    handle: &ConfigHandle,
    console: &Console,
) -> anyhow::Result<()> {
    let supervisor = SessionSupervisor::new();
    let mut session = components.main_session();
    let cfg = handle.snapshot();

    console.say(&format!(
        "GitBee ready: model {} | {} tools | peer review {}",
        cfg.llm.model,
        components.dispatcher.tool_names().len(),
        if cfg.peer_review.enabled { "on" } else { "off" }
    ));
    console.say("Type /clear to reset the conversation, /exit to quit. Ctrl+C interrupts a running request.");

    loop {
        let line = tokio::select! {
            line = console.read_line("\n> ") => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            console.say("\nGoodbye!");
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" | "exit" | "quit" => {
                console.say("Goodbye!");
                break;
            }
            "/clear" => {
                session.reset();
                console.say("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        // 每轮开始时重新读取配置
        let cfg = handle.current();
        let cancel = supervisor.begin_turn();
        let turn = session.submit(&cfg, input, &cancel);
        tokio::pin!(turn);
        let result = loop {
            tokio::select! {
                r = &mut turn => break r,
                _ = tokio::signal::ctrl_c() => supervisor.cancel(),
            }
        };

        match result {
            Ok(outcome) => console.say(&format!("\n{}", outcome)),
            Err(AgentError::Cancelled) => console.say("\nRequest interrupted by user"),
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                console.say(&format!("\nError: {}", e));
            }
        }
        let (prompt_tokens, completion_tokens, total) = components.llm.token_usage();
        tracing::debug!(prompt_tokens, completion_tokens, total, "Token usage");
    }
    Ok(())
}

async fn config_test(components: &AgentComponents, cfg: &AppConfig) -> anyhow::Result<()> {
    println!("Model: {} ({})", cfg.llm.model, cfg.llm.base_url);
    println!("GitHub API: {}", cfg.github.api_base_url);
    println!(
        "Peer review: {} (model {}, max {} iteration(s))",
        if cfg.peer_review.enabled { "enabled" } else { "disabled" },
        cfg.review_model(),
        cfg.peer_review.max_iterations
    );

    let gh = &components.github;
    let user = gh
        .get_json(&gh.api_url("user"), &[])
        .await
        .context("GitHub API check failed")?;
    println!(
        "GitHub API: OK (authenticated as {})",
        user.get("login").and_then(|v| v.as_str()).unwrap_or("unknown")
    );

    let response = components
        .llm
        .chat(ChatRequest {
            model: cfg.llm.model.clone(),
            messages: vec![Message::user("Reply with the single word: ok")],
            tools: Vec::new(),
            temperature: None,
        })
        .await
        .context("Model endpoint check failed")?;
    println!(
        "Model {}: OK ({})",
        cfg.llm.model,
        response.content.unwrap_or_default().trim()
    );
    Ok(())
}
