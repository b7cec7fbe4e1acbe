//! AgentLoop 端到端测试：MockClient 代替 Gemini，临时目录作为工作区

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;

use aide::core::{
    AgentEvent, AgentHandle, AgentLoop, AgentMode, CredentialPool, CycleOutcome, LoopState,
    Selection, UserInput,
};
use aide::llm::{Fragment, MockClient, MockReply, Part, Role, ServiceError, ToolCallRequest};
use aide::store::MemoryStore;
use aide::tools::{default_registry, Collaborators, Tool, ToolContext, ToolDispatcher, ToolRegistry};
use aide::workspace::{LocalWorkspace, Workspace};

struct Harness {
    agent: AgentLoop,
    client: Arc<MockClient>,
    events: mpsc::UnboundedReceiver<AgentEvent>,
    dir: TempDir,
}

impl Harness {
    fn new(keys: &[&str], replies: Vec<MockReply>) -> Self {
        Self::with_registry(keys, replies, default_registry())
    }

    fn with_registry(keys: &[&str], replies: Vec<MockReply>, registry: ToolRegistry) -> Self {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(MockClient::new(replies));
        let collab = Collaborators::with_defaults(Arc::new(MemoryStore::default()));
        let dispatcher = ToolDispatcher::new(registry, collab, 5);
        let (tx, events) = mpsc::unbounded_channel();
        let mut agent = AgentLoop::new(
            client.clone(),
            dispatcher,
            CredentialPool::new(keys.iter().map(|k| k.to_string()).collect()),
            Selection::new("gemini-2.5-flash", AgentMode::Code),
            Duration::from_secs(1),
            tx,
        );
        agent.open_workspace(Arc::new(LocalWorkspace::open(dir.path()).unwrap()));
        agent.start_session();
        let mut h = Self {
            agent,
            client,
            events,
            dir,
        };
        h.drain();
        h
    }

    fn drain(&mut self) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            out.push(e);
        }
        out
    }

    fn workspace(&self) -> Arc<dyn Workspace> {
        self.agent.workspace().unwrap().clone()
    }
}

/// 执行时取消当前一轮的工具，模拟用户在工具运行期间点击停止
struct StopCycleTool {
    handle: Arc<Mutex<Option<AgentHandle>>>,
}

#[async_trait]
impl Tool for StopCycleTool {
    fn name(&self) -> &str {
        "stop_cycle"
    }

    fn description(&self) -> &str {
        "Cancels the running cycle."
    }

    async fn execute(&self, _args: &Map<String, Value>, _ctx: &ToolContext<'_>) -> Result<Value, String> {
        let handle = self.handle.lock().unwrap().clone().ok_or("no handle")?;
        assert!(handle.cancel());
        Ok(json!({ "message": "stopped" }))
    }
}

/// 等到某条 Notice 出现
async fn wait_for_notice(events: &mut mpsc::UnboundedReceiver<AgentEvent>, prefix: &str) {
    while let Some(event) = events.recv().await {
        if matches!(&event, AgentEvent::Notice { message } if message.starts_with(prefix)) {
            return;
        }
    }
    panic!("event channel closed before notice '{prefix}'");
}

fn notices(events: &[AgentEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Notice { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_rotates_past_failing_keys() {
    let mut h = Harness::new(
        &["key-a", "key-b", "key-c"],
        vec![
            MockReply::auth_failure(),
            MockReply::auth_failure(),
            MockReply::text("Done."),
        ],
    );

    let outcome = h.agent.send_message(UserInput::text("hello")).await;
    assert_eq!(outcome, CycleOutcome::Completed);
    assert_eq!(h.agent.state(), LoopState::Idle);

    let creds: Vec<_> = h.client.requests().into_iter().map(|r| r.credential).collect();
    assert_eq!(creds, vec!["key-a", "key-b", "key-c"]);
    assert_eq!(h.agent.pool().index(), 2);
    assert_eq!(h.agent.pool().tried_count(), 2);

    let history = h.agent.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text(), "hello");
    assert_eq!(history[1].text(), "Done.");

    let waits = notices(&h.drain())
        .into_iter()
        .filter(|m| m == "API key failed. Waiting for 1s before retrying...")
        .count();
    assert_eq!(waits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_failing_key_is_terminal() {
    let mut h = Harness::new(&["only"], vec![MockReply::auth_failure()]);

    let outcome = h.agent.send_message(UserInput::text("hello")).await;
    let message = "All API keys failed. Please check your keys in the settings.";
    assert_eq!(
        outcome,
        CycleOutcome::Failed {
            message: message.to_string()
        }
    );
    assert_eq!(h.agent.state(), LoopState::Failed);
    assert_eq!(h.client.requests().len(), 1);
    assert!(h.agent.pool().exhausted());
    assert!(h.agent.history().is_empty());
    assert!(h.drain().contains(&AgentEvent::Error {
        message: message.to_string()
    }));
}

#[tokio::test(start_paused = true)]
async fn test_tool_results_are_sent_together() {
    let mut h = Harness::new(
        &["k"],
        vec![
            MockReply::tool_calls(vec![
                ToolCallRequest::new("read_file", json!({"filename": "notes.txt"})),
                ToolCallRequest::new("read_file", json!({"filename": "missing.txt"})),
            ]),
            MockReply::text("One file was readable."),
        ],
    );
    h.workspace()
        .write_file("notes.txt", "remember", true)
        .await
        .unwrap();

    let outcome = h.agent.send_message(UserInput::text("read both")).await;
    assert_eq!(outcome, CycleOutcome::Completed);

    let sent = h.client.requests();
    assert_eq!(sent.len(), 2);
    let tool_turn = sent[1].request.contents.last().unwrap();
    assert_eq!(tool_turn.role, Role::Tool);
    assert_eq!(tool_turn.parts.len(), 2);
    match (&tool_turn.parts[0], &tool_turn.parts[1]) {
        (Part::ToolResponse(ok), Part::ToolResponse(err)) => {
            assert!(ok.is_success());
            assert_eq!(ok.response["content"], "remember");
            assert!(!err.is_success());
            assert!(err
                .error_message()
                .unwrap()
                .starts_with("Error executing tool 'read_file':"));
        }
        other => panic!("unexpected parts {other:?}"),
    }

    // user, agent(calls), tool, agent(text)
    assert_eq!(h.agent.history().len(), 4);
    let events = h.drain();
    let results = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolResult { .. }))
        .count();
    assert_eq!(results, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_stream_dispatches_nothing() {
    let mut h = Harness::new(
        &["k"],
        vec![MockReply::fragments(vec![
            Fragment {
                text: Some("Creating files".into()),
                tool_calls: vec![ToolCallRequest::new(
                    "create_file",
                    json!({"filename": "a.txt", "content": "a"}),
                )],
            },
            Fragment::calls(vec![ToolCallRequest::new(
                "create_file",
                json!({"filename": "b.txt", "content": "b"}),
            )]),
            Fragment::text(" never shown"),
        ])],
    );

    let handle = h.agent.handle();
    let sending_seen = Arc::new(AtomicUsize::new(0));
    let seen = sending_seen.clone();
    h.client.on_fragment(move |i| {
        if handle.is_sending() {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        if i == 1 {
            assert!(handle.cancel());
            assert!(handle.cancel());
        }
    });

    let outcome = h.agent.send_message(UserInput::text("make two files")).await;
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert_eq!(h.agent.state(), LoopState::Cancelled);
    assert_eq!(sending_seen.load(Ordering::SeqCst), 2);
    assert!(!h.agent.handle().is_sending());
    assert!(!h.agent.cancel());

    assert_eq!(h.client.requests().len(), 1);
    assert!(h.agent.history().is_empty());
    assert!(!h.dir.path().join("a.txt").exists());
    assert!(!h.dir.path().join("b.txt").exists());

    let events = h.drain();
    assert!(events.contains(&AgentEvent::PartialText {
        text: "Creating files".into()
    }));
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::ToolCall { .. })));
    let cancelled = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancelled, 1);
    assert!(events.contains(&AgentEvent::Cancelled {
        message: "Cancelled by user.".into()
    }));
}

#[tokio::test(start_paused = true)]
async fn test_condense_replaces_long_history() {
    let mut replies: Vec<MockReply> = (0..5).map(|i| MockReply::text(&format!("answer {i}"))).collect();
    replies.push(MockReply::text(
        "Here is a summary of our conversation so far: five questions answered.",
    ));
    let mut h = Harness::new(&["k"], replies);

    for i in 0..5 {
        let outcome = h.agent.send_message(UserInput::text(format!("question {i}"))).await;
        assert_eq!(outcome, CycleOutcome::Completed);
    }
    assert_eq!(h.agent.history().len(), 10);
    let old_session = h.agent.sessions().session().unwrap().id;
    h.drain();

    h.agent.condense_history().await;

    let sent = h.client.requests();
    let summarize = sent.last().unwrap();
    assert!(!summarize.streamed);
    assert_eq!(summarize.request.contents.len(), 11);

    let events = h.drain();
    let summaries: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Summary { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        summaries,
        vec!["Here is a summary of our conversation so far: five questions answered."]
    );
    assert!(events.contains(&AgentEvent::LogCleared));
    assert_eq!(
        notices(&events),
        vec![
            "Condensing history... This will start a new session.",
            "Original conversation history has been condensed.",
        ]
    );

    let session = h.agent.sessions().session().unwrap();
    assert_ne!(session.id, old_session);
    assert!(session.history.is_empty());
    assert_eq!(h.agent.history_json(), "[]");
}

#[tokio::test(start_paused = true)]
async fn test_model_switch_keeps_history() {
    let mut h = Harness::new(&["k"], vec![MockReply::text("first"), MockReply::text("second")]);
    h.agent.send_message(UserInput::text("one")).await;

    h.agent.set_model("gemini-2.5-pro");
    h.agent.send_message(UserInput::text("two")).await;

    let sent = h.client.requests();
    assert_eq!(sent[1].request.model, "gemini-2.5-pro");
    let texts: Vec<_> = sent[1].request.contents.iter().map(|t| t.text()).collect();
    assert_eq!(texts, vec!["one", "first", "two"]);
    assert_eq!(h.agent.history().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_spaced_by_rate_limit() {
    let mut h = Harness::new(&["k"], vec![MockReply::text("a"), MockReply::text("b")]);
    let start = tokio::time::Instant::now();
    h.agent.send_message(UserInput::text("one")).await;
    h.agent.send_message(UserInput::text("two")).await;
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(notices(&h.drain())
        .iter()
        .any(|m| m == "Rate limit active. Waiting for 1s..."));
}

#[tokio::test(start_paused = true)]
async fn test_empty_reply_leaves_history_usable() {
    let mut h = Harness::new(&["k"], vec![MockReply::Stream(vec![]), MockReply::text("ok")]);

    assert_eq!(h.agent.send_message(UserInput::text("a")).await, CycleOutcome::Completed);
    assert!(h.agent.history().is_empty());

    assert_eq!(h.agent.send_message(UserInput::text("b")).await, CycleOutcome::Completed);
    let sent = h.client.requests();
    let contents = &sent[1].request.contents;
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].text(), "b");

    let history = h.agent.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|t| !t.parts.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_tools_run_keeps_results_without_resubmit() {
    let slot = Arc::new(Mutex::new(None));
    let mut registry = default_registry();
    registry.register(StopCycleTool {
        handle: slot.clone(),
    });
    let mut h = Harness::with_registry(
        &["k"],
        vec![MockReply::tool_calls(vec![ToolCallRequest::new("stop_cycle", json!({}))])],
        registry,
    );
    h.client.push(MockReply::text("never requested"));
    *slot.lock().unwrap() = Some(h.agent.handle());

    let outcome = h.agent.send_message(UserInput::text("stop midway")).await;
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert_eq!(h.client.requests().len(), 1);
    assert_eq!(h.client.remaining(), 1);

    let history = h.agent.history();
    assert_eq!(history.len(), 3);
    assert!(matches!(&history[1].parts[0], Part::ToolCall(c) if c.name == "stop_cycle"));
    assert_eq!(history[2].role, Role::Tool);
    match &history[2].parts[0] {
        Part::ToolResponse(r) => assert_eq!(r.response["message"], "stopped"),
        other => panic!("unexpected part {other:?}"),
    }

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolResult { success: true, .. })));
    assert!(events.contains(&AgentEvent::Cancelled {
        message: "Cancelled by user.".into()
    }));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_rate_limit_wait() {
    let Harness {
        mut agent,
        client,
        mut events,
        dir: _dir,
    } = Harness::new(&["k"], vec![MockReply::text("first"), MockReply::text("unused")]);
    assert_eq!(agent.send_message(UserInput::text("one")).await, CycleOutcome::Completed);

    let handle = agent.handle();
    let cycle = tokio::spawn(async move {
        let outcome = agent.send_message(UserInput::text("two")).await;
        (agent, outcome)
    });
    wait_for_notice(&mut events, "Rate limit active").await;
    assert!(handle.cancel());

    let (agent, outcome) = cycle.await.unwrap();
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert_eq!(client.requests().len(), 1);
    assert_eq!(client.remaining(), 1);
    assert_eq!(agent.history().len(), 2);
    assert!(!handle.is_sending());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_recovery_backoff() {
    let Harness {
        mut agent,
        client,
        mut events,
        dir: _dir,
    } = Harness::new(&["a", "b"], vec![MockReply::auth_failure(), MockReply::text("unused")]);

    let handle = agent.handle();
    let cycle = tokio::spawn(async move {
        let outcome = agent.send_message(UserInput::text("hello")).await;
        (agent, outcome)
    });
    wait_for_notice(&mut events, "API key failed").await;
    assert!(handle.cancel());

    let (agent, outcome) = cycle.await.unwrap();
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert_eq!(agent.state(), LoopState::Cancelled);
    let creds: Vec<_> = client.requests().into_iter().map(|r| r.credential).collect();
    assert_eq!(creds, vec!["a"]);
    assert_eq!(client.remaining(), 1);
    assert!(agent.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stream_failure_after_partial_text_retries_same_parts() {
    let mut h = Harness::new(
        &["a", "b"],
        vec![
            MockReply::Stream(vec![
                Ok(Fragment::text("Par")),
                Err(ServiceError::Api {
                    status: 503,
                    body: "overloaded".into(),
                }),
            ]),
            MockReply::text("Full answer"),
        ],
    );

    let outcome = h.agent.send_message(UserInput::text("hello")).await;
    assert_eq!(outcome, CycleOutcome::Completed);

    let sent = h.client.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].credential, "a");
    assert_eq!(sent[1].credential, "b");
    assert_eq!(sent[0].request.contents, sent[1].request.contents);

    let history = h.agent.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].text(), "Full answer");

    let partials: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::PartialText { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(partials, vec!["Par", "Full answer"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_on_tool_turn_keeps_calls_and_results() {
    let mut h = Harness::new(
        &["only"],
        vec![MockReply::tool_calls(vec![ToolCallRequest::new("teleport", json!({}))])],
    );
    h.client.push(MockReply::auth_failure());

    let outcome = h.agent.send_message(UserInput::text("go")).await;
    assert!(matches!(outcome, CycleOutcome::Failed { ref message } if message.starts_with("All API keys failed")));
    assert_eq!(h.client.requests().len(), 2);

    let history = h.agent.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].text(), "go");
    assert!(matches!(&history[1].parts[0], Part::ToolCall(c) if c.name == "teleport"));
    assert_eq!(history[2].role, Role::Tool);
    assert!(matches!(&history[2].parts[0], Part::ToolResponse(r) if !r.is_success()));
}
