//! 展示层事件：AgentLoop 与编排器通过无界通道向前端推送

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::core::state::{CycleOutcome, LoopState};
use crate::tools::WorkspaceView;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StateChanged { state: LoopState },
    /// 用户输入（含附件说明），用于回显
    UserMessage { text: String },
    /// 本轮模型回复到目前为止的完整文本
    PartialText { text: String },
    ToolCall { name: String, args: Map<String, Value> },
    ToolResult {
        name: String,
        success: bool,
        response: Map<String, Value>,
    },
    Notice { message: String },
    Error { message: String },
    /// 对话显示区被清空
    LogCleared,
    Summary { text: String },
    Cancelled { message: String },
    History { json: String },
    WorkspaceChanged,
    Done { outcome: CycleOutcome },
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// 通过事件通道通知工作区变化的视图
#[derive(Debug, Clone)]
pub struct ChannelView {
    tx: EventSender,
}

impl ChannelView {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }
}

impl WorkspaceView for ChannelView {
    fn refresh_workspace(&self) -> Result<(), String> {
        self.tx
            .send(AgentEvent::WorkspaceChanged)
            .map_err(|_| "event channel closed".to_string())
    }
}
