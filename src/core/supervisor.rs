//! 发送周期监管：单飞标志与取消令牌
//!
//! 每轮发送开始时换一个新的 CancellationToken；cancel 只在发送中生效，重复调用等同一次。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Inner {
    sending: AtomicBool,
    token: Mutex<CancellationToken>,
}

/// 可克隆的周期控制句柄
#[derive(Debug, Clone, Default)]
pub struct CycleControl {
    inner: Arc<Inner>,
}

impl CycleControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一轮：已有一轮在进行时返回 None
    ///
    /// 新令牌在持锁期间装好后才置 sending，cancel 也持同一把锁，不会落到上一轮的令牌上。
    pub fn begin(&self) -> Option<CancellationToken> {
        let mut current = self.token();
        if self.inner.sending.load(Ordering::Acquire) {
            return None;
        }
        let token = CancellationToken::new();
        *current = token.clone();
        self.inner.sending.store(true, Ordering::Release);
        Some(token)
    }

    pub fn finish(&self) {
        let _current = self.token();
        self.inner.sending.store(false, Ordering::Release);
    }

    /// 请求取消当前一轮；返回是否有一轮在进行
    pub fn cancel(&self) -> bool {
        let current = self.token();
        if !self.is_sending() {
            return false;
        }
        current.cancel();
        true
    }

    pub fn is_sending(&self) -> bool {
        self.inner.sending.load(Ordering::Acquire)
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.inner.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}
