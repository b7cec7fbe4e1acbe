//! LLM 层：对话数据模型、客户端抽象与实现（Gemini / Mock）

pub mod gemini;
pub mod mock;
pub mod traits;
pub mod types;

pub use gemini::{GeminiClient, GEMINI_API_BASE};
pub use mock::{MockClient, MockReply, RecordedRequest};
pub use traits::{FragmentStream, GenerativeClient, ServiceError};
pub use types::{
    Fragment, GenerateRequest, HarmCategory, HarmThreshold, Part, Role, SafetySetting,
    ToolCallRequest, ToolConfig, ToolDeclaration, ToolOutcome, ToolResult, Turn,
};
