//! 编辑器接口与无界面实现
//!
//! 维护打开的缓冲区、当前活动文件与活动文件内的选区（字符下标，左闭右开）。

use std::collections::BTreeMap;
use std::sync::Mutex;

/// 活动文件快照
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenFile {
    pub path: String,
    pub name: String,
    pub content: String,
}

pub trait Editor: Send + Sync {
    /// 打开文件并设为活动；已打开时切换过去并以 content 为准
    fn open_file(&self, path: &str, content: &str);

    /// 已打开时更新缓冲区内容，未打开时忽略
    fn update_content(&self, path: &str, content: &str);

    fn close_file(&self, path: &str);

    fn is_open(&self, path: &str) -> bool;

    fn active_file(&self) -> Option<OpenFile>;

    /// 当前非空选区的文本
    fn selected_text(&self) -> Option<String>;

    /// 用 text 替换当前非空选区；没有选区时返回 false
    fn replace_selection(&self, text: &str) -> bool;
}

#[derive(Debug, Default)]
struct EditorState {
    buffers: BTreeMap<String, String>,
    active: Option<String>,
    selection: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
pub struct HeadlessEditor {
    state: Mutex<EditorState>,
}

impl HeadlessEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在活动文件中选中 [start, end)；越界部分截到文件末尾
    pub fn select(&self, start: usize, end: usize) {
        let mut state = self.lock();
        let len = state
            .active
            .as_ref()
            .and_then(|p| state.buffers.get(p))
            .map(|c| c.chars().count())
            .unwrap_or(0);
        let (start, end) = (start.min(len), end.min(len));
        state.selection = Some((start.min(end), start.max(end)));
    }

    pub fn open_paths(&self) -> Vec<String> {
        self.lock().buffers.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Editor for HeadlessEditor {
    fn open_file(&self, path: &str, content: &str) {
        let mut state = self.lock();
        state.buffers.insert(path.to_string(), content.to_string());
        if state.active.as_deref() != Some(path) {
            state.selection = None;
        }
        state.active = Some(path.to_string());
    }

    fn update_content(&self, path: &str, content: &str) {
        let mut state = self.lock();
        if let Some(buf) = state.buffers.get_mut(path) {
            *buf = content.to_string();
            if state.active.as_deref() == Some(path) {
                state.selection = None;
            }
        }
    }

    fn close_file(&self, path: &str) {
        let mut state = self.lock();
        state.buffers.remove(path);
        if state.active.as_deref() == Some(path) {
            state.active = state.buffers.keys().next().cloned();
            state.selection = None;
        }
    }

    fn is_open(&self, path: &str) -> bool {
        self.lock().buffers.contains_key(path)
    }

    fn active_file(&self) -> Option<OpenFile> {
        let state = self.lock();
        let path = state.active.clone()?;
        let content = state.buffers.get(&path)?.clone();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Some(OpenFile { path, name, content })
    }

    fn selected_text(&self) -> Option<String> {
        let state = self.lock();
        let (start, end) = state.selection.filter(|(s, e)| s < e)?;
        let content = state.buffers.get(state.active.as_ref()?)?;
        Some(content.chars().skip(start).take(end - start).collect())
    }

    fn replace_selection(&self, text: &str) -> bool {
        let mut state = self.lock();
        let Some((start, end)) = state.selection.filter(|(s, e)| s < e) else {
            return false;
        };
        let Some(path) = state.active.clone() else {
            return false;
        };
        let Some(buf) = state.buffers.get_mut(&path) else {
            return false;
        };
        let chars: Vec<char> = buf.chars().collect();
        let mut next: String = chars[..start].iter().collect();
        next.push_str(text);
        next.extend(&chars[end..]);
        *buf = next;
        let new_end = start + text.chars().count();
        state.selection = Some((start, new_end));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sets_active() {
        let ed = HeadlessEditor::new();
        assert!(ed.active_file().is_none());
        ed.open_file("src/a.js", "a");
        ed.open_file("src/b.js", "b");
        let active = ed.active_file().unwrap();
        assert_eq!(active.path, "src/b.js");
        assert_eq!(active.name, "b.js");
        ed.close_file("src/b.js");
        assert_eq!(ed.active_file().unwrap().path, "src/a.js");
    }

    #[test]
    fn test_selection_replace() {
        let ed = HeadlessEditor::new();
        ed.open_file("a.txt", "hello wörld");
        assert!(ed.selected_text().is_none());
        assert!(!ed.replace_selection("x"));

        ed.select(6, 11);
        assert_eq!(ed.selected_text().as_deref(), Some("wörld"));
        assert!(ed.replace_selection("there"));
        assert_eq!(ed.active_file().unwrap().content, "hello there");
        assert_eq!(ed.selected_text().as_deref(), Some("there"));
    }

    #[test]
    fn test_empty_selection_is_none() {
        let ed = HeadlessEditor::new();
        ed.open_file("a.txt", "abc");
        ed.select(2, 2);
        assert!(ed.selected_text().is_none());
    }

    #[test]
    fn test_update_content_only_when_open() {
        let ed = HeadlessEditor::new();
        ed.update_content("x.txt", "nope");
        assert!(!ed.is_open("x.txt"));
        ed.open_file("x.txt", "old");
        ed.update_content("x.txt", "new");
        assert_eq!(ed.active_file().unwrap().content, "new");
    }
}
