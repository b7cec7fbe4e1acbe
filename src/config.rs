//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AIDE__*` 覆盖（双下划线表示嵌套，如 `AIDE__LLM__MODEL=gemini-2.5-pro`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::AgentMode;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub rate_limit: RateLimitSection,
    pub tools: ToolsSection,
}

/// [app] 段：启动时打开的工作区、键值存储位置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    /// 启动时打开的项目目录；未设置则不打开，运行中用 /open 指定
    pub workspace_root: Option<PathBuf>,
    /// SQLite 文件（API Key 列表、代码索引），未设置时用 ./data/aide.db
    pub store_path: Option<PathBuf>,
}

impl AppSection {
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/aide.db"))
    }
}

/// [llm] 段：模型、模式、端点与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub mode: AgentMode,
    /// 覆盖 Gemini API 地址（代理或测试）
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            mode: AgentMode::default(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
            stream: default_stream_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_stream_timeout() -> u64 {
    300
}

/// [rate_limit] 段：两次请求的最小间隔（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

fn default_min_interval_secs() -> u64 {
    5
}

/// [tools] 段：单次工具调用超时、终端与 URL 读取
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub url: UrlSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            terminal: TerminalSection::default(),
            url: UrlSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.terminal] 段
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalSection {
    #[serde(default = "default_terminal_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_terminal_timeout_secs(),
        }
    }
}

fn default_terminal_timeout_secs() -> u64 {
    15
}

/// [tools.url] 段：抓取超时、正文最大字符数、域名白名单（空 = 不限制）
#[derive(Debug, Clone, Deserialize)]
pub struct UrlSection {
    #[serde(default = "default_url_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

impl Default for UrlSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_url_timeout_secs(),
            max_result_chars: default_max_result_chars(),
            allowed_domains: Vec::new(),
        }
    }
}

fn default_url_timeout_secs() -> u64 {
    15
}

fn default_max_result_chars() -> usize {
    20_000
}

/// 从 config 目录加载配置，环境变量 AIDE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AIDE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AIDE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 按启动时相同的来源重新加载配置（调用方决定据此调整哪些运行时参数）
pub fn reload_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let cfg = load_config(config_path.map(Path::to_path_buf))?;
    tracing::info!(
        model = %cfg.llm.model,
        mode = %cfg.llm.mode,
        min_interval_secs = cfg.rate_limit.min_interval_secs,
        "configuration reloaded"
    );
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.mode, AgentMode::Code);
        assert_eq!(cfg.rate_limit.min_interval_secs, 5);
        assert_eq!(cfg.tools.terminal.timeout_secs, 15);
        assert!(cfg.tools.url.allowed_domains.is_empty());
        assert_eq!(cfg.app.store_path(), PathBuf::from("data/aide.db"));
    }

    #[test]
    fn test_explicit_file_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[llm]\nmodel = \"gemini-2.5-pro\"\nmode = \"plan\"\n\n[rate_limit]\nmin_interval_secs = 2\n\n[tools.url]\nallowed_domains = [\"docs.rs\"]\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.model, "gemini-2.5-pro");
        assert_eq!(cfg.llm.mode, AgentMode::Plan);
        assert_eq!(cfg.rate_limit.min_interval_secs, 2);
        assert_eq!(cfg.tools.url.allowed_domains, vec!["docs.rs"]);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }
}
