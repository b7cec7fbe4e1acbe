//! 凭据恢复策略
//!
//! 请求级失败时：把失败的 Key 记为已尝试并轮换到下一个；去重后的 Key 都试过（或达到最大尝试次数）即为耗尽。
//! 未耗尽时由调用方退避一个限流间隔、换新 Key 重建会话并重试同一批 Part。

use std::time::Duration;

use crate::core::credentials::CredentialPool;
use crate::core::rate_limit::RateLimitHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// 已轮换到下一个 Key，可重试
    Retry,
    /// 所有 Key 都已失败
    Exhausted,
}

/// 一轮发送内的恢复策略：最大尝试次数 = 去重后的池大小，退避 = 当前限流间隔
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    max_attempts: usize,
    failures: usize,
    backoff: RateLimitHandle,
}

impl RecoveryPolicy {
    pub fn new(max_attempts: usize, backoff: RateLimitHandle) -> Self {
        Self {
            max_attempts,
            failures: 0,
            backoff,
        }
    }

    pub fn for_pool(pool: &CredentialPool, backoff: RateLimitHandle) -> Self {
        Self::new(pool.distinct_len(), backoff)
    }

    /// 处理一次失败：记录当前 Key、轮换、判定是否耗尽
    pub fn on_failure(&mut self, pool: &mut CredentialPool) -> RecoveryDecision {
        self.failures += 1;
        let failed = pool.current();
        pool.rotate();
        tracing::warn!(
            failures = self.failures,
            tried = pool.tried_count(),
            next_index = pool.index(),
            had_key = failed.is_some(),
            "credential failed, rotated"
        );
        if pool.exhausted() || self.failures >= self.max_attempts {
            RecoveryDecision::Exhausted
        } else {
            RecoveryDecision::Retry
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff.interval()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}
