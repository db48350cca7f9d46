//! 节奏控制 - 业务能力层
//!
//! 两次导航之间随机等待，失败重试前指数退避

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::Config;

/// 节奏参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
}

impl RatePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
            jitter: Duration::from_millis(config.jitter_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_ceiling: Duration::from_millis(config.backoff_ceiling_ms),
        }
    }

    /// `base * 2^attempt`，不超过上限
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_ceiling)
    }
}

/// 限速器状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterState {
    pub last_request: Option<Instant>,
    pub backoff_multiplier: u32,
}

/// 限速器
///
/// 只被编排层持有，没有并发访问。
pub struct RateLimiter {
    policy: RatePolicy,
    state: RateLimiterState,
    rng: StdRng,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// 固定随机种子，便于复现
    pub fn with_seed(policy: RatePolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(policy: RatePolicy, rng: StdRng) -> Self {
        Self {
            policy,
            state: RateLimiterState {
                last_request: None,
                backoff_multiplier: 1,
            },
            rng,
        }
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    pub fn state(&self) -> RateLimiterState {
        self.state
    }

    /// 从 [min, max] 均匀抽取间隔，再叠加抖动
    fn draw_interval(&mut self) -> Duration {
        let min = self.policy.min_delay.as_millis() as u64;
        let max = self.policy.max_delay.as_millis() as u64;
        let base = if max > min { self.rng.gen_range(min..=max) } else { min };
        let jitter_max = self.policy.jitter.as_millis() as u64;
        let jitter = if jitter_max > 0 { self.rng.gen_range(0..=jitter_max) } else { 0 };
        Duration::from_millis(base + jitter)
    }

    /// 连续失败期间按退避倍数拉长间隔，最长不超过退避上限
    fn stretch(&self, interval: Duration) -> Duration {
        if self.state.backoff_multiplier <= 1 {
            return interval;
        }
        interval
            .saturating_mul(self.state.backoff_multiplier)
            .min(self.policy.backoff_ceiling.max(interval))
    }

    /// 阻塞到距离上一次放行已经过了足够长的随机间隔，返回实际等待时长
    pub async fn gate(&mut self) -> Duration {
        let drawn = self.draw_interval();
        let interval = self.stretch(drawn);
        if interval > drawn {
            debug!("节奏控制: 失败后放慢 x{}", self.state.backoff_multiplier);
        }
        let waited = match self.state.last_request {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    let remaining = interval - elapsed;
                    debug!("节奏控制: 等待 {:?}", remaining);
                    sleep(remaining).await;
                    remaining
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };
        self.state.last_request = Some(Instant::now());
        waited
    }

    /// 第 `attempt` 次失败后的退避等待（从 0 开始计数）
    pub async fn backoff(&mut self, attempt: u32) -> Duration {
        let delay = self.policy.backoff_delay(attempt);
        self.state.backoff_multiplier = 2u32.saturating_pow(attempt.min(16) + 1);
        debug!("退避 {:?} (第 {} 次失败)", delay, attempt + 1);
        sleep(delay).await;
        delay
    }

    /// 成功后恢复正常节奏
    pub fn reset_backoff(&mut self) {
        self.state.backoff_multiplier = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RatePolicy {
        RatePolicy {
            min_delay: Duration::from_millis(3_000),
            max_delay: Duration::from_millis(6_000),
            jitter: Duration::from_millis(500),
            backoff_base: Duration::from_millis(2_000),
            backoff_ceiling: Duration::from_millis(30_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_gates_are_at_least_min_apart() {
        let mut limiter = RateLimiter::with_seed(policy(), 7);
        limiter.gate().await;
        let mut previous = Instant::now();
        for _ in 0..20 {
            limiter.gate().await;
            let now = Instant::now();
            let gap = now - previous;
            assert!(gap >= Duration::from_millis(3_000), "gap {:?}", gap);
            assert!(gap <= Duration::from_millis(6_500), "gap {:?}", gap);
            previous = now;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_gate_does_not_wait() {
        let mut limiter = RateLimiter::with_seed(policy(), 1);
        assert_eq!(limiter.gate().await, Duration::ZERO);
        assert!(limiter.state().last_request.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_work_counts_towards_the_interval() {
        let mut limiter = RateLimiter::with_seed(policy(), 3);
        limiter.gate().await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(limiter.gate().await, Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_until_ceiling() {
        let p = policy();
        assert_eq!(p.backoff_delay(0), Duration::from_millis(2_000));
        assert_eq!(p.backoff_delay(1), Duration::from_millis(4_000));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(16_000));
        assert_eq!(p.backoff_delay(4), Duration::from_millis(30_000));
        assert_eq!(p.backoff_delay(40), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_slow_the_cadence_until_reset() {
        let mut limiter = RateLimiter::with_seed(policy(), 11);
        limiter.gate().await;
        limiter.backoff(0).await;
        // 退避本身的 2s 已计入间隔，倍数 2 时间隔至少 6s
        let waited = limiter.gate().await;
        assert!(waited >= Duration::from_millis(4_000), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(11_000), "waited {:?}", waited);

        limiter.reset_backoff();
        let start = Instant::now();
        limiter.gate().await;
        let gap = Instant::now() - start;
        assert!(gap <= Duration::from_millis(6_500), "gap {:?}", gap);
    }

    #[tokio::test(start_paused = true)]
    async fn stretched_interval_is_capped_at_the_ceiling() {
        let mut limiter = RateLimiter::with_seed(policy(), 13);
        limiter.backoff(10).await;
        limiter.gate().await;
        let start = Instant::now();
        limiter.gate().await;
        assert!(Instant::now() - start <= Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_tracks_multiplier_and_resets() {
        let mut limiter = RateLimiter::with_seed(policy(), 5);
        limiter.backoff(1).await;
        assert_eq!(limiter.state().backoff_multiplier, 4);
        limiter.reset_backoff();
        assert_eq!(limiter.state().backoff_multiplier, 1);
    }
}
