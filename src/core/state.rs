//! 循环状态与一轮发送的结果

use serde::Serialize;

/// AgentLoop 状态：Idle → Sending → Streaming → (ToolExecuting → Sending)* → Idle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    Sending,
    Streaming,
    ToolExecuting,
    Cancelled,
    Failed,
}

impl LoopState {
    /// 是否处于一轮发送之中
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            LoopState::Sending | LoopState::Streaming | LoopState::ToolExecuting
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// 上一轮仍在进行
    Busy,
    /// 没有文本也没有附件
    EmptyInput,
}

/// send_message 的结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    Cancelled,
    Failed { message: String },
    Rejected { reason: RejectReason },
}

impl CycleOutcome {
    /// 该结果对应的循环终态
    pub fn final_state(&self) -> LoopState {
        match self {
            CycleOutcome::Cancelled => LoopState::Cancelled,
            CycleOutcome::Failed { .. } => LoopState::Failed,
            CycleOutcome::Completed | CycleOutcome::Rejected { .. } => LoopState::Idle,
        }
    }
}
