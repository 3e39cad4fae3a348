//! 退避重试策略。

use std::time::Duration;

use crate::base_system::context::Config;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 首次失败后的额外尝试次数；0 表示不重试。
    pub max_retries: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let min_ms = cfg.min_wait_time.max(1);
        let max_ms = cfg.max_wait_time.max(min_ms);
        Self {
            max_retries: cfg.max_retries,
            min_wait: Duration::from_millis(min_ms),
            max_wait: Duration::from_millis(max_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// 第 `attempt` 次重试前的等待时间：min * 2^attempt，封顶 max。
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }
}
