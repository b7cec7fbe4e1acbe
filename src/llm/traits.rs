//! 生成式服务客户端抽象
//!
//! 所有后端（Gemini / Mock）实现 GenerativeClient：stream_generate（片段流）、generate（非流式）。
//! 凭据按次传入，便于上层在失败时轮换 API Key 而无需重建客户端。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::llm::{Fragment, GenerateRequest};

/// 请求级错误（网络、鉴权、限流、解析）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by service")]
    RateLimited,

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),
}

/// 片段流：逐个产出 Fragment，流结束即本轮回复结束
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, ServiceError>> + Send>>;

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// 流式生成
    async fn stream_generate(
        &self,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, ServiceError>;

    /// 非流式生成，返回聚合后的单个 Fragment
    async fn generate(
        &self,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<Fragment, ServiceError>;
}
