//! Agent 错误类型
//!
//! 配置类（无 API Key、无会话）、请求级（服务失败）、凭据耗尽、取消。
//! 工具执行失败不在此列：它们被 ToolDispatcher 转成 error 结果回传给模型。

use thiserror::Error;

use crate::llm::ServiceError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("No API key provided. Please add one in the settings.")]
    NoCredentials,

    #[error("No active chat session.")]
    NoActiveSession,

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("All API keys failed. Please check your keys in the settings.")]
    CredentialsExhausted,

    #[error("Cancelled by user.")]
    Cancelled,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
