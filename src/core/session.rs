//! 会话管理：(模型, 模式) 绑定的会话与有序历史
//!
//! 会话配置由模式确定：code 模式带完整工具声明与程序员提示，plan 模式只开联网搜索并带规划提示。
//! 会话启动时取凭据池的当前 Key（不计入已尝试）；请求失败由恢复策略记录并轮换。
//! 历史只在一轮请求完整结束后追加，重启时整体替换。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::credentials::CredentialPool;
use crate::core::error::AgentError;
use crate::core::prompts::{plan_prompt, CODE_PROMPT};
use crate::llm::{
    FragmentStream, GenerateRequest, GenerativeClient, HarmCategory, HarmThreshold, Role,
    SafetySetting, ToolConfig, ToolDeclaration, Turn,
};

/// 会话模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Code,
    Plan,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentMode::Code => write!(f, "code"),
            AgentMode::Plan => write!(f, "plan"),
        }
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(AgentMode::Code),
            "plan" => Ok(AgentMode::Plan),
            other => Err(format!("Unknown mode '{other}'. Use 'code' or 'plan'.")),
        }
    }
}

/// 用户当前选择的模型与模式；一轮发送开始时取快照
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub model: String,
    pub mode: AgentMode,
}

impl Selection {
    pub fn new(model: impl Into<String>, mode: AgentMode) -> Self {
        Self {
            model: model.into(),
            mode,
        }
    }
}

/// 会话的请求配置（除 contents 外的请求信封）
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub system_instruction: String,
    pub tools: ToolConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl SessionConfig {
    pub fn for_mode(mode: AgentMode, declarations: &[ToolDeclaration]) -> Self {
        let (system_instruction, tools) = match mode {
            AgentMode::Code => (
                CODE_PROMPT.to_string(),
                ToolConfig::FunctionDeclarations(declarations.to_vec()),
            ),
            AgentMode::Plan => (plan_prompt(), ToolConfig::GoogleSearch),
        };
        let safety_settings = HarmCategory::ALL
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: HarmThreshold::BlockMediumAndAbove,
            })
            .collect();
        Self {
            system_instruction,
            tools,
            safety_settings,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChatSession {
    pub id: Uuid,
    pub credential: String,
    pub selection: Selection,
    pub config: SessionConfig,
    pub history: Vec<Turn>,
}

pub struct SessionManager {
    client: Arc<dyn GenerativeClient>,
    declarations: Vec<ToolDeclaration>,
    session: Option<ChatSession>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn GenerativeClient>, declarations: Vec<ToolDeclaration>) -> Self {
        Self {
            client,
            declarations,
            session: None,
        }
    }

    /// 启动新会话；池为空时返回 NoCredentials 且不留下活动会话
    pub fn start(
        &mut self,
        selection: &Selection,
        pool: &CredentialPool,
        history: Vec<Turn>,
    ) -> Result<&ChatSession, AgentError> {
        let Some(credential) = pool.peek() else {
            self.session = None;
            return Err(AgentError::NoCredentials);
        };
        let session = ChatSession {
            id: Uuid::new_v4(),
            credential: credential.to_string(),
            selection: selection.clone(),
            config: SessionConfig::for_mode(selection.mode, &self.declarations),
            history,
        };
        tracing::info!(
            session_id = %session.id,
            model = %selection.model,
            mode = %selection.mode,
            history = session.history.len(),
            "chat session started"
        );
        Ok(&*self.session.insert(session))
    }

    /// 以给定历史重建会话（换模型/模式、凭据恢复）
    pub fn restart_with_history(
        &mut self,
        selection: &Selection,
        pool: &CredentialPool,
        history: Vec<Turn>,
    ) -> Result<&ChatSession, AgentError> {
        tracing::info!(history = history.len(), "restarting session with history");
        self.start(selection, pool, history)
    }

    pub fn matches(&self, selection: &Selection) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.selection == *selection)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// 当前历史的副本；无会话时为空
    pub fn history(&self) -> Vec<Turn> {
        self.session
            .as_ref()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.session = None;
    }

    /// 以 历史 + prompt 发起流式请求；流与会话解耦，调用方消费流时可继续修改自身状态
    pub async fn send_stream(&self, prompt: &Turn) -> Result<FragmentStream, AgentError> {
        let session = self.session.as_ref().ok_or(AgentError::NoActiveSession)?;
        let request = build_request(session, prompt);
        tracing::debug!(
            session_id = %session.id,
            contents = request.contents.len(),
            "stream request"
        );
        Ok(self
            .client
            .stream_generate(&session.credential, &request)
            .await?)
    }

    /// 追加一轮完整的 (prompt, reply)
    ///
    /// 回复没有任何内容（如被安全策略拦截）时不写入这次交换，服务端拒绝空 parts 的 model 轮次；
    /// prompt 若是工具结果则仍单独保留，使已记录的工具调用都有回复。
    pub fn record_exchange(&mut self, prompt: Turn, reply: Turn) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if reply.parts.is_empty() {
            tracing::warn!(session = %session.id, "empty model reply, exchange not recorded");
            if prompt.role == Role::Tool {
                session.history.push(prompt);
            }
            return;
        }
        session.history.push(prompt);
        session.history.push(reply);
    }

    /// 单独追加一个 Turn（取消时补上已执行工具的结果）
    pub fn append_turn(&mut self, turn: Turn) {
        if let Some(session) = self.session.as_mut() {
            session.history.push(turn);
        }
    }

    /// 非流式请求一次摘要，交换记入历史并返回摘要文本
    pub async fn summarize(&mut self, prompt: &str) -> Result<String, AgentError> {
        let session = self.session.as_ref().ok_or(AgentError::NoActiveSession)?;
        let prompt = Turn::user_text(prompt);
        let request = build_request(session, &prompt);
        let reply = self
            .client
            .generate(&session.credential, &request)
            .await?;
        let text = reply.text.unwrap_or_default();
        self.record_exchange(prompt, Turn::agent(&text, &reply.tool_calls));
        Ok(text)
    }
}

fn build_request(session: &ChatSession, prompt: &Turn) -> GenerateRequest {
    let mut contents = session.history.clone();
    contents.push(prompt.clone());
    GenerateRequest {
        model: session.selection.model.clone(),
        system_instruction: session.config.system_instruction.clone(),
        tools: session.config.tools.clone(),
        safety_settings: session.config.safety_settings.clone(),
        contents,
    }
}
