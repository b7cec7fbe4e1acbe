//! API Key 池：有序列表 + 当前下标 + 本轮已尝试集合
//!
//! 轮换是确定性的 round-robin；耗尽判定基于「去重后的已尝试 Key 数」，
//! 同一个 Key 反复取用不会提前（或延后）判定耗尽。

use std::collections::HashSet;

use crate::store::{KeyValueStore, StoreError};

/// Key 列表在键值存储中的键名
pub const CREDENTIALS_KEY: &str = "userApiKeys";

#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    keys: Vec<String>,
    index: usize,
    tried: HashSet<String>,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            index: 0,
            tried: HashSet::new(),
        }
    }

    /// 解析换行分隔的 Key 列表，丢弃空白行
    pub fn from_text(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// 从键值存储加载；未保存过时为空池
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let text = store.get(CREDENTIALS_KEY)?.unwrap_or_default();
        Ok(Self::from_text(&text))
    }

    /// 保存原始文本并返回重新加载的池（下标归零、已尝试集合清空）
    pub fn save(store: &dyn KeyValueStore, text: &str) -> Result<Self, StoreError> {
        store.put(CREDENTIALS_KEY, text)?;
        Self::load(store)
    }

    /// 当前 Key，并记为已尝试；空池返回 None
    pub fn current(&mut self) -> Option<String> {
        let key = self.keys.get(self.index)?.clone();
        self.tried.insert(key.clone());
        Some(key)
    }

    /// 当前 Key，不记为已尝试
    pub fn peek(&self) -> Option<&str> {
        self.keys.get(self.index).map(String::as_str)
    }

    pub fn rotate(&mut self) {
        if !self.keys.is_empty() {
            self.index = (self.index + 1) % self.keys.len();
        }
    }

    /// 去重后的已尝试数达到去重后的池大小
    pub fn exhausted(&self) -> bool {
        self.tried.len() >= self.distinct_len()
    }

    pub fn reset_tried(&mut self) {
        self.tried.clear();
    }

    pub fn tried_count(&self) -> usize {
        self.tried.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn distinct_len(&self) -> usize {
        self.keys.iter().collect::<HashSet<_>>().len()
    }
}
