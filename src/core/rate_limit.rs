//! 请求节流：两次出站请求之间至少间隔 min_interval
//!
//! 间隔存放在可克隆的 RateLimitHandle 中，运行时可随时修改；
//! 已经开始的等待使用开始时读到的间隔，不会被追溯缩短。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// 共享的最小间隔（毫秒）
#[derive(Debug, Clone)]
pub struct RateLimitHandle(Arc<AtomicU64>);

impl RateLimitHandle {
    pub fn new(interval: Duration) -> Self {
        Self(Arc::new(AtomicU64::new(interval.as_millis() as u64)))
    }

    pub fn set_interval(&self, interval: Duration) {
        self.0.store(interval.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    interval: RateLimitHandle,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: RateLimitHandle::new(interval),
            last_request: None,
        }
    }

    pub fn handle(&self) -> RateLimitHandle {
        self.interval.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval.interval()
    }

    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    /// 现在发请求需要等待多久；无需等待时为 None
    pub fn pending_delay(&self) -> Option<Duration> {
        let last = self.last_request?;
        let elapsed = last.elapsed();
        let interval = self.interval();
        (elapsed < interval).then(|| interval - elapsed)
    }

    /// 必要时等待，然后把「上次请求时间」记为等待结束的时刻；返回实际等待时长
    pub async fn wait_if_needed(&mut self) -> Duration {
        let delay = self.pending_delay().unwrap_or_default();
        if !delay.is_zero() {
            tracing::info!(delay_ms = delay.as_millis() as u64, "rate limit active, waiting");
            tokio::time::sleep(delay).await;
        }
        self.last_request = Some(Instant::now());
        delay
    }

    /// 失败后的退避：等待一个完整间隔，不更新上次请求时间
    pub async fn backoff(&self) {
        tokio::time::sleep(self.interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        assert_eq!(limiter.wait_if_needed().await, Duration::ZERO);
        assert!(limiter.last_request().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced_by_interval() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        limiter.wait_if_needed().await;
        let first = limiter.last_request().unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        limiter.wait_if_needed().await;
        let second = limiter.last_request().unwrap();
        assert!(second - first >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.wait_if_needed().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(limiter.wait_if_needed().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reducing_interval_mid_wait_keeps_started_wait() {
        let mut limiter = RateLimiter::new(Duration::from_secs(10));
        let handle = limiter.handle();
        limiter.wait_if_needed().await;
        let first = limiter.last_request().unwrap();

        let shrink = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.set_interval(Duration::from_secs(1));
        });
        let waited = limiter.wait_if_needed().await;
        shrink.await.unwrap();

        assert_eq!(waited, Duration::from_secs(10));
        assert!(limiter.last_request().unwrap() - first >= Duration::from_secs(10));
        // 新的等待读取最新间隔
        assert_eq!(limiter.pending_delay(), Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_does_not_touch_last_request() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        limiter.wait_if_needed().await;
        let last = limiter.last_request();
        limiter.backoff().await;
        assert_eq!(limiter.last_request(), last);
        assert_eq!(limiter.pending_delay(), None);
    }
}
