//! 工作区文件系统
//!
//! `Workspace` 是核心与项目目录之间的窄接口；`LocalWorkspace` 绑定一个根目录，
//! 所有路径按 `/` 分段做词法规整，`..` 逃出根目录即拒绝。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

/// 遍历（搜索、索引）时跳过的目录
pub const IGNORED_DIRS: [&str; 4] = [".git", "node_modules", "dist", "build"];

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Path escapes the project folder: {0}")]
    PathEscape(String),

    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("{op} '{path}' failed: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Join(String),
}

impl WorkspaceError {
    fn io(op: &'static str, path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return WorkspaceError::NotFound(path.to_string());
        }
        WorkspaceError::Io {
            op,
            path: path.to_string(),
            source,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// 目录树节点；子节点目录在前、同类按名称排序
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// 根名称一行，随后是 `├── └── │` 连接的树
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.name);
        render_children(&self.children, "", &mut out);
        out
    }
}

fn render_children(children: &[TreeNode], prefix: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&child.name);
        out.push('\n');
        if child.kind == EntryKind::Directory {
            let next = format!("{prefix}{}", if last { "    " } else { "│   " });
            render_children(&child.children, &next, out);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineMatch {
    pub line_number: usize,
    pub line_content: String,
}

/// 单个文件内的搜索命中
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub file: String,
    pub matches: Vec<LineMatch>,
}

/// 项目工作区接口；路径均相对于工作区根目录，以 `/` 分隔
#[async_trait]
pub trait Workspace: Send + Sync {
    /// 工作区名称（根目录名）
    fn name(&self) -> &str;

    fn root(&self) -> &Path;

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError>;

    /// 写文件；create 为 true 时自动创建父目录与文件，否则文件必须已存在
    async fn write_file(&self, path: &str, content: &str, create: bool) -> Result<(), WorkspaceError>;

    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError>;

    async fn remove_file(&self, path: &str) -> Result<(), WorkspaceError>;

    /// 递归删除目录
    async fn remove_dir(&self, path: &str) -> Result<(), WorkspaceError>;

    /// 重命名文件或目录；跨设备等情况下退化为复制后删除
    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError>;

    async fn structure(&self) -> Result<TreeNode, WorkspaceError>;

    /// 大小写不敏感的逐行子串搜索
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, WorkspaceError>;

    /// 全部文件的相对路径（跳过 IGNORED_DIRS），已排序
    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError>;
}

/// 本地目录工作区
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    name: String,
}

impl LocalWorkspace {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let display = root.as_ref().display().to_string();
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| WorkspaceError::io("open", &display, e))?;
        if !root.is_dir() {
            return Err(WorkspaceError::InvalidPath(display));
        }
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| display.clone());
        Ok(Self { root, name })
    }

    /// 词法规整相对路径：忽略空段与 `.`，`..` 回退一级，回退越过根目录即拒绝
    pub fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let mut parts: Vec<String> = Vec::new();
        for seg in path.split(['/', '\\']) {
            match seg {
                "" | "." => {}
                ".." => {
                    parts
                        .pop()
                        .ok_or_else(|| WorkspaceError::PathEscape(path.to_string()))?;
                }
                s => {
                    if Path::new(s)
                        .components()
                        .any(|c| !matches!(c, Component::Normal(_)))
                    {
                        return Err(WorkspaceError::PathEscape(path.to_string()));
                    }
                    parts.push(s.to_string());
                }
            }
        }
        Ok(parts.iter().fold(self.root.clone(), |acc, p| acc.join(p)))
    }

    /// 同 resolve，但拒绝指向根目录本身
    fn resolve_entry(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(WorkspaceError::InvalidPath(path.to_string()));
        }
        Ok(full)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, WorkspaceError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, WorkspaceError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(root))
            .await
            .map_err(|e| WorkspaceError::Join(e.to_string()))?
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        let full = self.resolve_entry(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| WorkspaceError::io("read", path, e))
    }

    async fn write_file(&self, path: &str, content: &str, create: bool) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        if create {
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| WorkspaceError::io("create directory", path, e))?;
            }
        } else if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| WorkspaceError::io("write", path, e))?;
        tracing::debug!(path = %path, bytes = content.len(), "workspace write");
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| WorkspaceError::io("create directory", path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| WorkspaceError::io("delete", path, e))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        tokio::fs::remove_dir_all(&full)
            .await
            .map_err(|e| WorkspaceError::io("delete directory", path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), WorkspaceError> {
        let src = self.resolve_entry(from)?;
        let dst = self.resolve_entry(to)?;
        let (from, to) = (from.to_string(), to.to_string());
        self.blocking(move |_| move_entry(&src, &dst, &from, &to)).await
    }

    async fn structure(&self) -> Result<TreeNode, WorkspaceError> {
        let name = self.name.clone();
        self.blocking(move |root| build_tree(&root, name)).await
    }

    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, WorkspaceError> {
        let needle = term.to_lowercase();
        self.blocking(move |root| {
            let mut hits = Vec::new();
            for (rel, full) in walk_files(&root) {
                let Ok(content) = std::fs::read_to_string(&full) else {
                    tracing::debug!(file = %rel, "skipping unreadable file in search");
                    continue;
                };
                let matches: Vec<LineMatch> = content
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| line.to_lowercase().contains(&needle))
                    .map(|(i, line)| LineMatch {
                        line_number: i + 1,
                        line_content: line.trim().to_string(),
                    })
                    .collect();
                if !matches.is_empty() {
                    hits.push(SearchHit { file: rel, matches });
                }
            }
            Ok(hits)
        })
        .await
    }

    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError> {
        self.blocking(|root| Ok(walk_files(&root).into_iter().map(|(rel, _)| rel).collect()))
            .await
    }
}

/// 遍历根目录下的文件，返回 (相对路径, 绝对路径)，按路径排序
fn walk_files(root: &Path) -> Vec<(String, PathBuf)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && IGNORED_DIRS.iter().any(|d| e.file_name() == *d))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = relative_display(root, e.path())?;
            Some((rel, e.into_path()))
        })
        .collect()
}

fn relative_display(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn build_tree(dir: &Path, name: String) -> Result<TreeNode, WorkspaceError> {
    let display = dir.display().to_string();
    let mut children = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| WorkspaceError::io("list", &display, e))?;
    for entry in entries.filter_map(Result::ok) {
        let child_name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            children.push(build_tree(&entry.path(), child_name)?);
        } else {
            children.push(TreeNode {
                name: child_name,
                kind: EntryKind::File,
                children: Vec::new(),
            });
        }
    }
    children.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
    Ok(TreeNode {
        name,
        kind: EntryKind::Directory,
        children,
    })
}

fn move_entry(src: &Path, dst: &Path, from: &str, to: &str) -> Result<(), WorkspaceError> {
    if !src.exists() {
        return Err(WorkspaceError::NotFound(from.to_string()));
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io("create directory", to, e))?;
    }
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    // rename 失败（如跨设备）时复制后删除
    if src.is_dir() {
        for entry in WalkDir::new(src).into_iter().filter_map(Result::ok) {
            let Ok(rel) = entry.path().strip_prefix(src) else {
                continue;
            };
            let target = dst.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)
                    .map_err(|e| WorkspaceError::io("create directory", to, e))?;
            } else {
                std::fs::copy(entry.path(), &target).map_err(|e| WorkspaceError::io("copy", from, e))?;
            }
        }
        std::fs::remove_dir_all(src).map_err(|e| WorkspaceError::io("delete directory", from, e))
    } else {
        std::fs::copy(src, dst).map_err(|e| WorkspaceError::io("copy", from, e))?;
        std::fs::remove_file(src).map_err(|e| WorkspaceError::io("delete", from, e))
    }
}
