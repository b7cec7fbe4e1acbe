//! URL 读取：抓取页面，提取可读文本与链接
//!
//! GET 请求带超时与 User-Agent；HTML 经 html2text 转为文本，href 链接按页面地址补全并去重；
//! 正文超过 max_result_chars 时截断并追加 ...[truncated]。allowed_domains 为空表示不限制域名。

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Serialize;

/// 页面内容
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UrlContent {
    pub content: String,
    pub links: Vec<String>,
}

#[async_trait]
pub trait UrlReader: Send + Sync {
    async fn read(&self, url: &str) -> Result<UrlContent, String>;
}

pub struct HttpUrlReader {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl HttpUrlReader {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_result_chars,
        }
    }

    fn check_url(&self, raw: &str) -> Result<Url, String> {
        let url = Url::parse(raw).map_err(|e| format!("Invalid URL '{raw}': {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported URL scheme: {}", url.scheme()));
        }
        let host = url
            .host_str()
            .map(str::to_lowercase)
            .ok_or_else(|| format!("Invalid URL '{raw}': missing host"))?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&host) {
            Ok(url)
        } else {
            Err(format!("Domain not in allowlist: {host}"))
        }
    }
}

#[async_trait]
impl UrlReader for HttpUrlReader {
    async fn read(&self, raw: &str) -> Result<UrlContent, String> {
        let url = self.check_url(raw.trim())?;
        tracing::info!(url = %url, "read url");

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let (content, links) = if looks_like_html(body) {
            (html_to_text(body), extract_links(&url, body))
        } else {
            (body.to_string(), Vec::new())
        };
        Ok(UrlContent {
            content: truncate(&content, self.max_result_chars),
            links,
        })
    }
}

fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    let head = s.get(..s.len().min(512)).unwrap_or(s).to_lowercase();
    head.starts_with("<!") || head.starts_with("<html") || head.contains("<head") || head.contains("<body")
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => html.to_string(),
    }
}

/// 提取 href 链接：相对地址按 base 补全，只保留 http(s)，保序去重
fn extract_links(base: &Url, html: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let re = HREF.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+)["']"#).expect("href regex is valid")
    });

    let mut seen = HashSet::new();
    re.captures_iter(html)
        .filter_map(|c| base.join(c[1].trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(String::from)
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text.to_string()
    }
}
