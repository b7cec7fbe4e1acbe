//! 对话数据模型：Turn / Part / 工具调用与结果 / 请求信封
//!
//! 与具体后端无关；Gemini 线上格式的转换在 gemini.rs 中完成。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 对话角色：用户、模型（agent）、工具结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    Tool,
}

/// 模型发出的工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    Error,
}

/// 工具执行结果（回传给模型的 functionResponse）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub response: Map<String, Value>,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// 成功结果：对象载荷原样作为 response，其它 JSON 值包进 `result` 字段
    pub fn success(name: impl Into<String>, payload: Value) -> Self {
        let response = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            name: name.into(),
            response,
            outcome: ToolOutcome::Success,
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut response = Map::new();
        response.insert("error".to_string(), Value::String(message.into()));
        Self {
            name: name.into(),
            response,
            outcome: ToolOutcome::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ToolOutcome::Success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.response.get("error").and_then(|v| v.as_str())
    }
}

/// Turn 的组成部分
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    /// 内联二进制（如图片），data 为 base64
    InlineData { mime_type: String, data: String },
    ToolCall(ToolCallRequest),
    ToolResponse(ToolResult),
}

/// 一次角色发言
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::Text(text.into())])
    }

    /// 模型回复：非空文本在前，随后是工具调用
    pub fn agent(text: &str, calls: &[ToolCallRequest]) -> Self {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        parts.extend(calls.iter().cloned().map(Part::ToolCall));
        Self {
            role: Role::Agent,
            parts,
        }
    }

    pub fn tool(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            parts: results.into_iter().map(Part::ToolResponse).collect(),
        }
    }

    /// 拼接所有文本 Part
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// 流式响应中的一个片段：可能含文本增量与工具调用
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }

    pub fn merge(&mut self, other: Fragment) {
        if let Some(t) = other.text {
            self.text.get_or_insert_with(String::new).push_str(&t);
        }
        self.tool_calls.extend(other.tool_calls);
    }
}

/// 工具声明：名称、描述、参数 schema（无参数时为 None）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// 会话启用的工具能力
#[derive(Clone, Debug, PartialEq)]
pub enum ToolConfig {
    FunctionDeclarations(Vec<ToolDeclaration>),
    /// 仅启用服务端联网搜索
    GoogleSearch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarmCategory {
    Harassment,
    HateSpeech,
    SexuallyExplicit,
    DangerousContent,
}

impl HarmCategory {
    pub const ALL: [HarmCategory; 4] = [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HarmCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
            HarmCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            HarmCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarmThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

impl HarmThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarmThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
            HarmThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            HarmThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            HarmThreshold::BlockNone => "BLOCK_NONE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmThreshold,
}

/// 单次发送的完整请求信封
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    pub tools: ToolConfig,
    pub safety_settings: Vec<SafetySetting>,
    pub contents: Vec<Turn>,
}
