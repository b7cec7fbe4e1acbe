//! Mock 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预设回复（片段序列或错误），并记录每次请求使用的凭据与内容，
//! 便于断言凭据轮换、历史重放与工具结果回传。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::llm::{
    Fragment, FragmentStream, GenerateRequest, GenerativeClient, ServiceError, ToolCallRequest,
};

/// 一条脚本化回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 按序产出的片段；其中的 Err 表示流中途失败
    Stream(Vec<Result<Fragment, ServiceError>>),
    /// 请求阶段直接失败
    Fail(ServiceError),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        MockReply::Stream(vec![Ok(Fragment::text(text))])
    }

    pub fn fragments(fragments: Vec<Fragment>) -> Self {
        MockReply::Stream(fragments.into_iter().map(Ok).collect())
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        MockReply::Stream(vec![Ok(Fragment::calls(calls))])
    }

    pub fn auth_failure() -> Self {
        MockReply::Fail(ServiceError::Auth("API key not valid".to_string()))
    }
}

/// 已发出的请求快照
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub credential: String,
    pub request: GenerateRequest,
    pub streamed: bool,
}

type FragmentHook = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    hook: Mutex<Option<FragmentHook>>,
}

impl MockClient {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// 每产出一个片段前调用 hook(序号)，测试中用来在流的中途触发取消
    pub fn on_fragment(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Arc::new(hook));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }

    fn next_reply(&self, credential: &str, request: &GenerateRequest, streamed: bool) -> MockReply {
        lock(&self.requests).push(RecordedRequest {
            credential: credential.to_string(),
            request: request.clone(),
            streamed,
        });
        lock(&self.replies).pop_front().unwrap_or_else(|| {
            MockReply::Fail(ServiceError::Api {
                status: 500,
                body: "no scripted reply".to_string(),
            })
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl GenerativeClient for MockClient {
    async fn stream_generate(
        &self,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, ServiceError> {
        match self.next_reply(credential, request, true) {
            MockReply::Fail(e) => Err(e),
            MockReply::Stream(items) => {
                let hook = lock(&self.hook).clone();
                let s = stream::iter(items.into_iter().enumerate()).map(move |(i, item)| {
                    if let Some(h) = &hook {
                        h(i);
                    }
                    item
                });
                Ok(Box::pin(s))
            }
        }
    }

    async fn generate(
        &self,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<Fragment, ServiceError> {
        match self.next_reply(credential, request, false) {
            MockReply::Fail(e) => Err(e),
            MockReply::Stream(items) => {
                let mut out = Fragment::default();
                for item in items {
                    out.merge(item?);
                }
                Ok(out)
            }
        }
    }
}
