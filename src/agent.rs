//! Agent 构建器：统一的 AgentLoop 初始化逻辑
//!
//! 按配置组装 Gemini 客户端、键值存储、凭据池、工具目录与协作者；
//! 测试或其它前端可以替换其中任意一项（如 MockClient、MemoryStore）。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::AppConfig;
use crate::core::{AgentLoop, ChannelView, CredentialPool, EventSender, Selection};
use crate::editor::HeadlessEditor;
use crate::llm::{GeminiClient, GenerativeClient};
use crate::services::{HttpUrlReader, LocalTerminal, WhitespaceFormatter};
use crate::store::{KeyValueStore, SqliteStore};
use crate::tools::{default_registry, Collaborators, ToolDispatcher};
use crate::workspace::LocalWorkspace;

pub struct AgentBuilder {
    config: AppConfig,
    client: Option<Arc<dyn GenerativeClient>>,
    store: Option<Arc<dyn KeyValueStore>>,
    collaborators: Option<Collaborators>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            client: None,
            store: None,
            collaborators: None,
        }
    }

    /// 替换生成式服务客户端（默认按 [llm] 段创建 GeminiClient）
    pub fn with_client(mut self, client: Arc<dyn GenerativeClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// 替换键值存储（默认打开 [app].store_path 处的 SQLite）
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 整体替换协作者；其中的 store 同时用于加载 API Key
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// 构建 AgentLoop：加载 Key、打开配置中的工作区、启动首个会话
    pub fn build(self, events: EventSender) -> anyhow::Result<AgentLoop> {
        let cfg = self.config;

        let collab = match self.collaborators {
            Some(collab) => collab,
            None => {
                let store: Arc<dyn KeyValueStore> = match self.store {
                    Some(store) => store,
                    None => {
                        let path = cfg.app.store_path();
                        Arc::new(SqliteStore::open(&path).with_context(|| {
                            format!("Failed to open store at {}", path.display())
                        })?)
                    }
                };
                default_collaborators(&cfg, store, events.clone())
            }
        };

        let client: Arc<dyn GenerativeClient> = match self.client {
            Some(client) => client,
            None => Arc::new(GeminiClient::new(
                cfg.llm.base_url.as_deref(),
                cfg.llm.timeouts.request,
                cfg.llm.timeouts.stream,
            )),
        };

        let pool = CredentialPool::load(collab.store.as_ref()).context("Failed to load API keys")?;
        tracing::info!(keys = pool.len(), "credentials loaded");

        let dispatcher = ToolDispatcher::new(default_registry(), collab, cfg.tools.tool_timeout_secs);
        let mut agent = AgentLoop::new(
            client,
            dispatcher,
            pool,
            Selection::new(cfg.llm.model.clone(), cfg.llm.mode),
            Duration::from_secs(cfg.rate_limit.min_interval_secs),
            events,
        );

        if let Some(root) = &cfg.app.workspace_root {
            let ws = LocalWorkspace::open(root)
                .with_context(|| format!("Failed to open workspace {}", root.display()))?;
            agent.open_workspace(Arc::new(ws));
        }
        agent.start_session();
        Ok(agent)
    }
}

fn default_collaborators(
    cfg: &AppConfig,
    store: Arc<dyn KeyValueStore>,
    events: EventSender,
) -> Collaborators {
    Collaborators {
        editor: Arc::new(HeadlessEditor::new()),
        terminal: Arc::new(LocalTerminal::new(cfg.tools.terminal.timeout_secs)),
        urls: Arc::new(HttpUrlReader::new(
            cfg.tools.url.allowed_domains.clone(),
            cfg.tools.url.timeout_secs,
            cfg.tools.url.max_result_chars,
        )),
        store,
        formatter: Arc::new(WhitespaceFormatter),
        view: Arc::new(ChannelView::new(events)),
    }
}
