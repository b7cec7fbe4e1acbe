//! 工具执行上下文
//!
//! Collaborators 汇总工具可以调用的外部协作者（编辑器、终端、URL 读取、存储、格式化、视图刷新），
//! ToolContext 在每次调用时再附上当前工作区。

use std::sync::Arc;

use crate::editor::{Editor, HeadlessEditor};
use crate::services::{
    CodeFormatter, HttpUrlReader, LocalTerminal, TerminalService, UrlReader, WhitespaceFormatter,
};
use crate::store::KeyValueStore;
use crate::workspace::Workspace;

/// 未打开工作区时的错误文本
pub const NO_WORKSPACE: &str = "No project folder is open. Ask the user to open one.";

/// 展示层：工作区内容变化后刷新（文件树等）
pub trait WorkspaceView: Send + Sync {
    fn refresh_workspace(&self) -> Result<(), String>;
}

/// 只记录日志的视图
#[derive(Debug, Default, Clone, Copy)]
pub struct LogView;

impl WorkspaceView for LogView {
    fn refresh_workspace(&self) -> Result<(), String> {
        tracing::debug!("workspace changed");
        Ok(())
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub editor: Arc<dyn Editor>,
    pub terminal: Arc<dyn TerminalService>,
    pub urls: Arc<dyn UrlReader>,
    pub store: Arc<dyn KeyValueStore>,
    pub formatter: Arc<dyn CodeFormatter>,
    pub view: Arc<dyn WorkspaceView>,
}

impl Collaborators {
    /// 默认实现：无界面编辑器、本机终端（15s）、不限域名的 URL 读取、空白格式化、日志视图
    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            editor: Arc::new(HeadlessEditor::new()),
            terminal: Arc::new(LocalTerminal::new(15)),
            urls: Arc::new(HttpUrlReader::new(Vec::new(), 15, 20_000)),
            store,
            formatter: Arc::new(WhitespaceFormatter),
            view: Arc::new(LogView),
        }
    }

    pub fn with_editor(mut self, editor: Arc<dyn Editor>) -> Self {
        self.editor = editor;
        self
    }

    pub fn with_terminal(mut self, terminal: Arc<dyn TerminalService>) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_url_reader(mut self, urls: Arc<dyn UrlReader>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_view(mut self, view: Arc<dyn WorkspaceView>) -> Self {
        self.view = view;
        self
    }
}

/// 单次工具调用的上下文
pub struct ToolContext<'a> {
    pub workspace: Option<&'a Arc<dyn Workspace>>,
    pub collab: &'a Collaborators,
}

impl<'a> ToolContext<'a> {
    pub fn workspace(&self) -> Result<&'a Arc<dyn Workspace>, String> {
        self.workspace.ok_or_else(|| NO_WORKSPACE.to_string())
    }
}
