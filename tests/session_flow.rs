//! 会话端到端测试：脚本化模型 + 模拟 GitHub
//!
//! 覆盖 PR 评审闸门（通过后提交、多轮未通过后放弃）与破坏性操作确认。

use std::sync::Arc;

use gitbee::config::AppConfig;
use gitbee::core::{AgentBuilder, AgentComponents};
use gitbee::github::{GitHubClient, GitHubSettings};
use gitbee::llm::ScriptedLlmClient;
use gitbee::memory::Role;
use gitbee::review::StaticReviewPrompt;
use gitbee::session::{ToolCallingSession, TurnOutcome};
use gitbee::tools::{StaticConfirmer, CANCELLED_BY_USER};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PR_URL: &str = "https://github.com/octo/demo/pull/7";

fn github(server: &MockServer) -> Arc<GitHubClient> {
    Arc::new(
        GitHubClient::new(GitHubSettings {
            api_base_url: server.uri(),
            api_version: "2022-11-28".to_string(),
            token: Some("test-token".to_string()),
            timeout_secs: 5,
            max_retries: 0,
            rate_limit_low_water: 100,
        })
        .unwrap(),
    )
}

fn components(
    cfg: &AppConfig,
    server: &MockServer,
    llm: Arc<ScriptedLlmClient>,
    confirmer: Arc<StaticConfirmer>,
    prompt: Arc<StaticReviewPrompt>,
) -> AgentComponents {
    AgentBuilder::new(cfg.clone())
        .with_llm(llm)
        .with_github(github(server))
        .with_confirmer(confirmer)
        .with_review_prompt(prompt)
        .build()
        .unwrap()
}

fn create_args() -> String {
    create_args_on(
        "feature/retry",
        json!([{"file_path": "src/retry.rs", "new_content": "pub fn retry() {}"}]),
    )
}

fn create_args_on(branch: &str, files: serde_json::Value) -> String {
    json!({
        "repo": "octo/demo",
        "title": "Add retry",
        "body": "Adds a retry helper",
        "new_branch": branch,
        "files": files,
        "commit_message": "Add retry helper"
    })
    .to_string()
}

fn iterate_args() -> String {
    json!({
        "repo": "octo/demo",
        "title": "Add retry",
        "body": "Adds a retry helper",
        "branch_name": "feature/retry-v2",
        "files": [{"file_path": "src/retry.rs", "new_content": "pub fn retry(n: u32) {}"}],
        "commit_message": "Add retry helper with attempts",
        "feedback_context": "made attempts configurable"
    })
    .to_string()
}

fn verdict(decision: &str, feedback: &str) -> String {
    format!(
        "```json\n{}\n```",
        json!({"decision": decision, "feedback": feedback, "suggestions": ["be specific"]})
    )
}

fn tool_results(session: &ToolCallingSession) -> Vec<String> {
    session
        .transcript()
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.text().to_string())
        .collect()
}

async fn mount_pr_flow(server: &MockServer) {
    let get = |p: &str, body: serde_json::Value| {
        Mock::given(method("GET"))
            .and(path(p.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    };
    let post = |p: &str, body: serde_json::Value| {
        Mock::given(method("POST"))
            .and(path(p.to_string()))
            .respond_with(ResponseTemplate::new(201).set_body_json(body))
            .expect(1)
    };

    get(
        "/repos/octo/demo",
        json!({"default_branch": "main", "permissions": {"push": true}}),
    )
    .mount(server)
    .await;
    get("/repos/octo/demo/git/ref/heads/main", json!({"object": {"sha": "base-sha"}}))
        .mount(server)
        .await;
    get("/repos/octo/demo/git/commits/base-sha", json!({"tree": {"sha": "base-tree"}}))
        .mount(server)
        .await;
    post("/repos/octo/demo/git/trees", json!({"sha": "new-tree"}))
        .mount(server)
        .await;
    post("/repos/octo/demo/git/commits", json!({"sha": "new-commit"}))
        .mount(server)
        .await;
    post("/repos/octo/demo/git/refs", json!({"ref": "refs/heads/feature/retry"}))
        .mount(server)
        .await;
    post("/repos/octo/demo/pulls", json!({"number": 7, "html_url": PR_URL}))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_direct_submission_without_peer_review() {
    let server = MockServer::start().await;
    mount_pr_flow(&server).await;

    let cfg = AppConfig::default();
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.reply_tool_call("c1", "create_pull_request", &create_args())
        .reply_text("Done.");

    let c = components(
        &cfg,
        &server,
        llm.clone(),
        Arc::new(StaticConfirmer::new(false)),
        Arc::new(StaticReviewPrompt::new(false)),
    );
    let mut session = c.main_session();
    session
        .submit(&cfg, "add a retry helper", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tool_results(&session), vec![PR_URL.to_string()]);
    // 未经评审：只有主会话的两次模型调用
    assert_eq!(llm.requests().len(), 2);
}

#[tokio::test]
async fn test_approved_pull_request_is_submitted() {
    let server = MockServer::start().await;
    mount_pr_flow(&server).await;

    let mut cfg = AppConfig::default();
    cfg.peer_review.enabled = true;
    cfg.peer_review.model = Some("grok-reviewer".into());

    let llm = Arc::new(ScriptedLlmClient::new());
    llm.reply_tool_call("c1", "create_pull_request", &create_args())
        .reply_text(&verdict("approve", "Looks good"))
        .reply_text("Opened the pull request.");

    let c = components(
        &cfg,
        &server,
        llm.clone(),
        Arc::new(StaticConfirmer::new(false)),
        Arc::new(StaticReviewPrompt::new(false)),
    );
    let mut session = c.main_session();
    let out = session
        .submit(&cfg, "add a retry helper to octo/demo", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, TurnOutcome::Reply("Opened the pull request.".into()));

    let results = tool_results(&session);
    assert_eq!(results.len(), 1);
    assert!(results[0].contains("approved by peer review agent after 1 iteration(s)"));
    assert!(results[0].ends_with(PR_URL));
    assert!(session.gate().unwrap().pending("octo/demo").is_none());

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    let reviewer = &requests[1];
    assert_eq!(reviewer.model, "grok-reviewer");
    assert_eq!(reviewer.temperature, Some(0.3));
    let names: Vec<&str> = reviewer.tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"get_repo_info"));
    assert!(!names.contains(&"create_pull_request"));
    assert!(!names.contains(&"delete_file"));
    assert!(reviewer.messages[1].text().contains("add a retry helper to octo/demo"));
}

#[tokio::test]
async fn test_unapproved_pull_request_is_abandoned_at_iteration_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut cfg = AppConfig::default();
    cfg.peer_review.enabled = true;
    cfg.peer_review.max_iterations = 2;

    let llm = Arc::new(ScriptedLlmClient::new());
    llm.reply_tool_call("c1", "create_pull_request", &create_args())
        .reply_text(&verdict("request_changes", "Make attempts configurable"))
        .reply_text("I'll revise it.")
        .reply_tool_call("c2", "iterate_pull_request", &iterate_args())
        .reply_text(&verdict("request_changes", "Still missing backoff"))
        .reply_text("Review did not approve.");

    let prompt = Arc::new(StaticReviewPrompt::new(false));
    let c = components(
        &cfg,
        &server,
        llm.clone(),
        Arc::new(StaticConfirmer::new(false)),
        prompt.clone(),
    );
    let mut session = c.main_session();
    let cancel = CancellationToken::new();

    session.submit(&cfg, "add a retry helper", &cancel).await.unwrap();
    let pending = session.gate().unwrap().pending("octo/demo").unwrap();
    assert_eq!(pending.current_iteration, 1);
    assert!(tool_results(&session)[0].starts_with("Peer review feedback (iteration 1)"));

    session.submit(&cfg, "address the feedback", &cancel).await.unwrap();
    let results = tool_results(&session);
    assert_eq!(results.len(), 2);
    assert!(results[1].starts_with("Pull request submission cancelled after 2 review iteration(s)"));
    assert!(results[1].contains("Still missing backoff"));
    assert!(session.gate().unwrap().pending("octo/demo").is_none());
    assert_eq!(prompt.final_decisions(), 1);

    // 第二轮评审请求带上了第一轮的历史与迭代说明
    let second_review = &llm.requests()[4];
    let request = second_review.messages[1].text();
    assert!(request.contains("- Iteration 1: request_changes - Make attempts configurable"));
    assert!(request.contains("Addressed feedback: made attempts configurable"));
}

#[tokio::test]
async fn test_new_pull_request_starts_fresh_review() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut cfg = AppConfig::default();
    cfg.peer_review.enabled = true;
    cfg.peer_review.max_iterations = 2;

    let file = json!([{"file_path": "src/a.rs", "new_content": "pub fn a() {}"}]);
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.reply_tool_call("c1", "create_pull_request", &create_args_on("feat-a", file.clone()))
        .reply_text(&verdict("request_changes", "Split this up"))
        .reply_text("Moving on to something else.")
        .reply_tool_call("c2", "create_pull_request", &create_args_on("feat-b", file))
        .reply_text(&verdict("request_changes", "Add tests"))
        .reply_text("Will add tests.");

    let prompt = Arc::new(StaticReviewPrompt::new(false));
    let c = components(
        &cfg,
        &server,
        llm.clone(),
        Arc::new(StaticConfirmer::new(false)),
        prompt.clone(),
    );
    let mut session = c.main_session();
    let cancel = CancellationToken::new();

    session.submit(&cfg, "open PR A", &cancel).await.unwrap();
    session.submit(&cfg, "open PR B", &cancel).await.unwrap();

    // 第二个 PR 不继承第一个 PR 的轮数，不会触发上限确认
    assert_eq!(prompt.final_decisions(), 0);
    let results = tool_results(&session);
    assert!(results[1].starts_with("Peer review feedback (iteration 1)"));
    let pending = session.gate().unwrap().pending("octo/demo").unwrap();
    assert_eq!(pending.current_iteration, 1);
    assert_eq!(pending.draft.branch_name, "feat-b");

    let second_review = llm.requests()[4].messages[1].text().to_string();
    assert!(second_review.contains("This is the first review iteration."));
    assert!(!second_review.contains("Split this up"));
}

#[tokio::test]
async fn test_empty_files_rejected_before_review() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut cfg = AppConfig::default();
    cfg.peer_review.enabled = true;

    let llm = Arc::new(ScriptedLlmClient::new());
    llm.reply_tool_call("c1", "create_pull_request", &create_args_on("feature/empty", json!([])))
        .reply_text("Nothing to submit.");

    let prompt = Arc::new(StaticReviewPrompt::new(false));
    let c = components(
        &cfg,
        &server,
        llm.clone(),
        Arc::new(StaticConfirmer::new(false)),
        prompt,
    );
    let mut session = c.main_session();
    session
        .submit(&cfg, "open an empty PR", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        tool_results(&session),
        vec!["Error: 'files' must be a non-empty list".to_string()]
    );
    // 没有评审模型调用
    assert_eq!(llm.requests().len(), 2);
    assert!(session.gate().unwrap().pending("octo/demo").is_none());
}

#[tokio::test]
async fn test_declined_delete_never_reaches_github() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = AppConfig::default();
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.reply_tool_call("c1", "delete_file", r#"{"repo":"octo/demo","path":"README.md"}"#)
        .reply_text("Deletion was cancelled.");

    let confirmer = Arc::new(StaticConfirmer::new(false));
    let c = components(
        &cfg,
        &server,
        llm,
        confirmer.clone(),
        Arc::new(StaticReviewPrompt::new(false)),
    );
    let mut session = c.main_session();
    let out = session
        .submit(&cfg, "delete README.md in octo/demo", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, TurnOutcome::Reply("Deletion was cancelled.".into()));
    assert_eq!(tool_results(&session), vec![CANCELLED_BY_USER.to_string()]);
    assert_eq!(confirmer.asked(), vec!["delete_file".to_string()]);
}
