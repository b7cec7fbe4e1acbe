//! 核心编排层：凭据池、限流、会话、恢复策略、周期监管、主循环与编排器

pub mod agent_loop;
pub mod credentials;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod rate_limit;
pub mod recovery;
pub mod session;
pub mod state;
pub mod supervisor;

pub use agent_loop::{AgentHandle, AgentLoop, Attachment, UserInput};
pub use credentials::{CredentialPool, CREDENTIALS_KEY};
pub use error::AgentError;
pub use events::{AgentEvent, ChannelView, EventSender};
pub use orchestrator::{create_agent, spawn_driver, Command};
pub use rate_limit::{RateLimitHandle, RateLimiter};
pub use recovery::{RecoveryDecision, RecoveryPolicy};
pub use session::{AgentMode, ChatSession, Selection, SessionConfig, SessionManager};
pub use state::{CycleOutcome, LoopState, RejectReason};
pub use supervisor::CycleControl;
