//! Google Gemini 客户端（Generative Language API）
//!
//! - 流式：`streamGenerateContent?alt=sse`，逐行解析 SSE 的 `data:` 事件为 Fragment
//! - 非流式：`generateContent`
//! - 鉴权：`x-goog-api-key` 头，凭据由调用方逐次传入

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;

use crate::llm::{
    Fragment, FragmentStream, GenerateRequest, GenerativeClient, Part, Role, ServiceError,
    ToolCallRequest, ToolConfig,
};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(base_url: Option<&str>, connect_timeout_secs: u64, stream_timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(stream_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url
                .unwrap_or(GEMINI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn api_url(&self, model: &str, stream: bool) -> String {
        if stream {
            format!("{}/{}:streamGenerateContent?alt=sse", self.base_url, model)
        } else {
            format!("{}/{}:generateContent", self.base_url, model)
        }
    }

    async fn post(
        &self,
        url: &str,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<reqwest::Response, ServiceError> {
        let body = build_request_body(request);
        tracing::debug!(model = %request.model, turns = request.contents.len(), "Gemini request");

        let response = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => ServiceError::Auth(text),
            429 => ServiceError::RateLimited,
            code => ServiceError::Api { status: code, body: text },
        })
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn stream_generate(
        &self,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, ServiceError> {
        let url = self.api_url(&request.model, true);
        let response = self.post(&url, credential, request).await?;
        Ok(sse_fragments(response))
    }

    async fn generate(
        &self,
        credential: &str,
        request: &GenerateRequest,
    ) -> Result<Fragment, ServiceError> {
        let url = self.api_url(&request.model, false);
        let response = self.post(&url, credential, request).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;
        parse_chunk(&json)
    }
}

fn sse_fragments(response: reqwest::Response) -> FragmentStream {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    sse_events(tokio::io::BufReader::new(StreamReader::new(bytes)))
}

/// 按 SSE 分帧：空行分隔事件，多行 `data:` 以换行拼接，末尾事件可以没有空行；`\r\n` 与 `\n` 均可
fn sse_events<R>(reader: R) -> FragmentStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let lines = reader.lines();

    let events = stream::unfold(Some(lines), |state| async move {
        let mut lines = state?;
        let mut data = String::new();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        if data.is_empty() {
                            continue;
                        }
                        break;
                    }
                    if let Some(payload) = line.strip_prefix("data:") {
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(payload.trim_start());
                    }
                }
                Ok(None) if data.is_empty() => return None,
                Ok(None) => {
                    let item = parse_event(&data);
                    return Some((item, None));
                }
                Err(e) => return Some((Err(ServiceError::Network(e.to_string())), None)),
            }
        }
        let item = parse_event(&data);
        Some((item, Some(lines)))
    });
    Box::pin(events)
}

fn parse_event(data: &str) -> Result<Fragment, ServiceError> {
    let json: Value =
        serde_json::from_str(data).map_err(|e| ServiceError::Parse(format!("{e}: {data}")))?;
    parse_chunk(&json)
}

/// 解析单个 GenerateContentResponse：首个 candidate 的文本与 functionCall
pub(crate) fn parse_chunk(json: &Value) -> Result<Fragment, ServiceError> {
    if let Some(err) = json.get("error") {
        let status = err["code"].as_u64().unwrap_or(500) as u16;
        let body = err["message"].as_str().unwrap_or("unknown error").to_string();
        return Err(match status {
            401 | 403 => ServiceError::Auth(body),
            429 => ServiceError::RateLimited,
            _ => ServiceError::Api { status, body },
        });
    }

    let mut fragment = Fragment::default();
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    for part in &parts {
        if let Some(t) = part["text"].as_str() {
            if !t.is_empty() {
                fragment.text.get_or_insert_with(String::new).push_str(t);
            }
        }
        if let Some(fc) = part.get("functionCall") {
            let name = fc["name"].as_str().unwrap_or("").to_string();
            fragment
                .tool_calls
                .push(ToolCallRequest::new(name, fc["args"].clone()));
        }
    }
    Ok(fragment)
}

/// 构建 Gemini 请求体
pub(crate) fn build_request_body(request: &GenerateRequest) -> Value {
    let contents: Vec<Value> = request
        .contents
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User | Role::Tool => "user",
                Role::Agent => "model",
            };
            let parts: Vec<Value> = turn.parts.iter().map(part_to_json).collect();
            json!({ "role": role, "parts": parts })
        })
        .collect();

    let tools = match &request.tools {
        ToolConfig::FunctionDeclarations(decls) => json!([{ "functionDeclarations": decls }]),
        ToolConfig::GoogleSearch => json!([{ "googleSearch": {} }]),
    };

    let safety: Vec<Value> = request
        .safety_settings
        .iter()
        .map(|s| json!({ "category": s.category.as_str(), "threshold": s.threshold.as_str() }))
        .collect();

    json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": contents,
        "tools": tools,
        "safetySettings": safety,
    })
}

fn part_to_json(part: &Part) -> Value {
    match part {
        Part::Text(text) => json!({ "text": text }),
        Part::InlineData { mime_type, data } => {
            json!({ "inlineData": { "mimeType": mime_type, "data": data } })
        }
        Part::ToolCall(call) => json!({ "functionCall": { "name": call.name, "args": call.args } }),
        Part::ToolResponse(result) => {
            json!({ "functionResponse": { "name": result.name, "response": result.response } })
        }
    }
}
