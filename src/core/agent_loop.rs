//! Agent 主循环：发送 → 流式接收 →（工具并发执行 → 结果回传）* → 结束
//!
//! 一轮由 send_message 驱动，同一时间只允许一轮（CycleControl 单飞）。每次请求前先过限流；
//! 请求级失败交给 RecoveryPolicy 轮换 Key，未耗尽则退避一个间隔、带原历史重建会话并重试同一批 Part。
//! 取消是协作式的：在片段之间、工具分发前、结果回传前检查。
//!
//! 历史提交规则：一次交换只在流完整结束且未被取消时写入；工具已经执行过的结果在取消或失败时
//! 单独补进历史，使每个已记录的工具调用都有对应的回复。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::credentials::CredentialPool;
use crate::core::error::AgentError;
use crate::core::events::{AgentEvent, EventSender};
use crate::core::prompts::CONDENSE_PROMPT;
use crate::core::rate_limit::{RateLimitHandle, RateLimiter};
use crate::core::recovery::{RecoveryDecision, RecoveryPolicy};
use crate::core::session::{AgentMode, Selection, SessionManager};
use crate::core::state::{CycleOutcome, LoopState, RejectReason};
use crate::core::supervisor::CycleControl;
use crate::llm::{GenerativeClient, Part, Role, ToolCallRequest, Turn};
use crate::tools::ToolDispatcher;
use crate::workspace::Workspace;

/// 随消息发送的附件（内联 base64）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime_for(path), &bytes))
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// 一条用户输入：文本和/或附件
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInput {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }

    fn display(&self) -> String {
        let mut shown = self.text.trim().to_string();
        if let Some(a) = &self.attachment {
            shown.push_str(&format!("\n[Attached: {}]", a.name));
        }
        shown.trim().to_string()
    }

    /// 文本在前，附件在后
    fn into_parts(self) -> Vec<Part> {
        let mut parts = Vec::with_capacity(2);
        let text = self.text.trim();
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        if let Some(a) = self.attachment {
            parts.push(Part::InlineData {
                mime_type: a.mime_type,
                data: a.data,
            });
        }
        parts
    }
}

/// 其它任务持有的控制句柄：取消、发送标志、限流间隔
#[derive(Debug, Clone)]
pub struct AgentHandle {
    control: CycleControl,
    rate: RateLimitHandle,
}

impl AgentHandle {
    /// 取消当前一轮；空闲时无效果
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    pub fn is_sending(&self) -> bool {
        self.control.is_sending()
    }

    pub fn set_rate_limit(&self, interval: Duration) {
        self.rate.set_interval(interval);
    }

    pub fn rate_limit(&self) -> Duration {
        self.rate.interval()
    }
}

/// 一次流式回复的结局
enum StreamEnd {
    Complete {
        text: String,
        calls: Vec<ToolCallRequest>,
    },
    Cancelled,
}

pub struct AgentLoop {
    sessions: SessionManager,
    pool: CredentialPool,
    limiter: RateLimiter,
    dispatcher: ToolDispatcher,
    workspace: Option<Arc<dyn Workspace>>,
    selection: Selection,
    control: CycleControl,
    state: LoopState,
    events: EventSender,
}

impl AgentLoop {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        dispatcher: ToolDispatcher,
        pool: CredentialPool,
        selection: Selection,
        min_interval: Duration,
        events: EventSender,
    ) -> Self {
        let sessions = SessionManager::new(client, dispatcher.declarations());
        Self {
            sessions,
            pool,
            limiter: RateLimiter::new(min_interval),
            dispatcher,
            workspace: None,
            selection,
            control: CycleControl::new(),
            state: LoopState::Idle,
            events,
        }
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            control: self.control.clone(),
            rate: self.limiter.handle(),
        }
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn history(&self) -> Vec<Turn> {
        self.sessions.history()
    }

    pub fn workspace(&self) -> Option<&Arc<dyn Workspace>> {
        self.workspace.as_ref()
    }

    /// 以当前选择启动一个空会话；失败时发出错误事件
    pub fn start_session(&mut self) -> bool {
        match self.sessions.start(&self.selection, &self.pool, Vec::new()) {
            Ok(_) => true,
            Err(e) => {
                self.error(e.to_string());
                false
            }
        }
    }

    /// 下一轮发送时生效
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.selection.model = model.into();
        tracing::info!(model = %self.selection.model, "model selected");
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        self.selection.mode = mode;
        tracing::info!(mode = %mode, "mode selected");
    }

    pub fn set_rate_limit(&self, interval: Duration) {
        self.limiter.handle().set_interval(interval);
        tracing::info!(interval_ms = interval.as_millis() as u64, "rate limit updated");
    }

    pub fn open_workspace(&mut self, workspace: Arc<dyn Workspace>) {
        tracing::info!(root = %workspace.root().display(), "workspace opened");
        self.notice(format!("Opened project folder '{}'.", workspace.name()));
        self.workspace = Some(workspace);
        self.emit(AgentEvent::WorkspaceChanged);
    }

    /// 保存 Key 列表并重新加载；活动会话换用新池的当前 Key（保留历史）
    pub fn save_credentials(&mut self, text: &str) -> Result<usize, AgentError> {
        let store = self.dispatcher.collaborators().store.clone();
        self.pool = CredentialPool::save(store.as_ref(), text)?;
        let count = self.pool.len();
        self.notice(format!("Saved {count} API key(s)."));

        if self.sessions.is_active() {
            let selection = self.sessions.session().map(|s| s.selection.clone());
            let history = self.sessions.history();
            if let Some(selection) = selection {
                if let Err(e) = self.sessions.restart_with_history(&selection, &self.pool, history) {
                    self.error(e.to_string());
                }
            }
        }
        Ok(count)
    }

    /// 执行一轮完整的发送
    pub async fn send_message(&mut self, input: UserInput) -> CycleOutcome {
        if input.is_empty() {
            return CycleOutcome::Rejected {
                reason: RejectReason::EmptyInput,
            };
        }
        let Some(token) = self.control.begin() else {
            return CycleOutcome::Rejected {
                reason: RejectReason::Busy,
            };
        };

        let outcome = self.run_cycle(input, &token).await;

        self.control.finish();
        self.set_state(outcome.final_state());
        tracing::info!(outcome = ?outcome, "send cycle finished");
        self.emit(AgentEvent::Done {
            outcome: outcome.clone(),
        });
        outcome
    }

    /// 取消当前一轮；返回是否有一轮在进行
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    async fn run_cycle(&mut self, input: UserInput, token: &CancellationToken) -> CycleOutcome {
        self.pool.reset_tried();
        let selection = self.selection.clone();
        if !self.sessions.matches(&selection) {
            let history = self.sessions.history();
            if let Err(e) = self.sessions.restart_with_history(&selection, &self.pool, history) {
                return self.fail(e.to_string());
            }
        }

        self.emit(AgentEvent::UserMessage {
            text: input.display(),
        });
        tracing::info!(query = %input.text.trim(), "user query");

        let mut prompt = Turn::user(input.into_parts());
        let mut policy = RecoveryPolicy::for_pool(&self.pool, self.limiter.handle());

        loop {
            if token.is_cancelled() {
                return self.cancelled(prompt);
            }
            if let Some(delay) = self.limiter.pending_delay() {
                self.notice(format!(
                    "Rate limit active. Waiting for {}s...",
                    ceil_secs(delay)
                ));
            }
            let cancelled = tokio::select! {
                biased;
                _ = token.cancelled() => true,
                _ = self.limiter.wait_if_needed() => false,
            };
            if cancelled {
                return self.cancelled(prompt);
            }

            self.set_state(LoopState::Sending);
            tracing::debug!(
                key_index = self.pool.index(),
                model = %selection.model,
                "sending turn"
            );

            match self.stream_reply(&prompt, token).await {
                Ok(StreamEnd::Cancelled) => return self.cancelled(prompt),
                Ok(StreamEnd::Complete { text, calls }) => {
                    if !text.is_empty() {
                        tracing::info!(chars = text.len(), "agent reply");
                    }
                    if calls.is_empty() {
                        self.sessions.record_exchange(prompt, Turn::agent(&text, &calls));
                        return CycleOutcome::Completed;
                    }
                    if token.is_cancelled() {
                        return self.cancelled(prompt);
                    }
                    self.sessions.record_exchange(prompt, Turn::agent(&text, &calls));
                    prompt = self.dispatch(&calls).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, key_index = self.pool.index(), "turn failed");
                    if policy.on_failure(&mut self.pool) == RecoveryDecision::Exhausted {
                        tracing::error!("all API keys failed");
                        self.keep_tool_results(prompt);
                        return self.fail(AgentError::CredentialsExhausted.to_string());
                    }
                    self.notice(format!(
                        "API key failed. Waiting for {}s before retrying...",
                        ceil_secs(policy.backoff())
                    ));
                    let cancelled = tokio::select! {
                        biased;
                        _ = token.cancelled() => true,
                        _ = self.limiter.backoff() => false,
                    };
                    if cancelled {
                        return self.cancelled(prompt);
                    }
                    let history = self.sessions.history();
                    if let Err(e) = self.sessions.restart_with_history(&selection, &self.pool, history) {
                        self.keep_tool_results(prompt);
                        return self.fail(e.to_string());
                    }
                }
            }
        }
    }

    /// 发送一次并消费片段流：文本累积并发布，工具调用收集
    async fn stream_reply(
        &mut self,
        prompt: &Turn,
        token: &CancellationToken,
    ) -> Result<StreamEnd, AgentError> {
        let mut stream = self.sessions.send_stream(prompt).await?;
        self.set_state(LoopState::Streaming);

        let mut text = String::new();
        let mut calls = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                item = stream.next() => item,
                _ = token.cancelled() => return Ok(StreamEnd::Cancelled),
            };
            let Some(item) = next else {
                break;
            };
            let fragment = item?;
            if let Some(delta) = fragment.text.filter(|t| !t.is_empty()) {
                text.push_str(&delta);
                self.emit(AgentEvent::PartialText { text: text.clone() });
            }
            calls.extend(fragment.tool_calls);
            if token.is_cancelled() {
                return Ok(StreamEnd::Cancelled);
            }
        }
        Ok(StreamEnd::Complete { text, calls })
    }

    /// 并发执行本轮全部工具调用，返回作为下一轮 prompt 的结果 Turn
    async fn dispatch(&mut self, calls: &[ToolCallRequest]) -> Turn {
        self.set_state(LoopState::ToolExecuting);
        for call in calls {
            self.emit(AgentEvent::ToolCall {
                name: call.name.clone(),
                args: call.args.clone(),
            });
        }
        let results = self
            .dispatcher
            .execute_all(calls, self.workspace.as_ref())
            .await;
        for result in &results {
            self.emit(AgentEvent::ToolResult {
                name: result.name.clone(),
                success: result.is_success(),
                response: result.response.clone(),
            });
        }
        Turn::tool(results)
    }

    /// 压缩历史：请求一次摘要，清空显示，以空历史开新会话
    pub async fn condense_history(&mut self) {
        if !self.sessions.is_active() {
            self.notice("No active session to condense.");
            return;
        }
        self.notice("Condensing history... This will start a new session.");
        if self.sessions.history().is_empty() {
            self.notice("History is already empty.");
            return;
        }

        match self.sessions.summarize(CONDENSE_PROMPT).await {
            Ok(summary) => {
                self.emit(AgentEvent::LogCleared);
                self.notice("Original conversation history has been condensed.");
                self.emit(AgentEvent::Summary { text: summary });
                self.start_session();
            }
            Err(e) => {
                tracing::warn!(error = %e, "condense failed");
                self.error(format!("An error occurred: {e}"));
            }
        }
    }

    pub fn clear_history(&mut self) {
        self.emit(AgentEvent::LogCleared);
        self.notice("Conversation history cleared.");
        self.start_session();
    }

    /// 当前历史的 JSON；无会话时为 "[]"
    pub fn history_json(&self) -> String {
        if !self.sessions.is_active() {
            return "[]".to_string();
        }
        serde_json::to_string_pretty(&self.sessions.history()).unwrap_or_else(|_| "[]".to_string())
    }

    fn keep_tool_results(&mut self, prompt: Turn) {
        if prompt.role == Role::Tool {
            self.sessions.append_turn(prompt);
        }
    }

    fn cancelled(&mut self, prompt: Turn) -> CycleOutcome {
        self.keep_tool_results(prompt);
        tracing::info!("send cycle cancelled");
        self.emit(AgentEvent::Cancelled {
            message: AgentError::Cancelled.to_string(),
        });
        CycleOutcome::Cancelled
    }

    fn fail(&mut self, message: String) -> CycleOutcome {
        self.error(message.clone());
        CycleOutcome::Failed { message }
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            self.state = state;
            self.emit(AgentEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: AgentEvent) {
        // 前端已退出时事件直接丢弃
        let _ = self.events.send(event);
    }

    fn notice(&self, message: impl Into<String>) {
        self.emit(AgentEvent::Notice {
            message: message.into(),
        });
    }

    fn error(&self, message: impl Into<String>) {
        self.emit(AgentEvent::Error {
            message: message.into(),
        });
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_millis().div_ceil(1000) as u64
}
