use std::time::Duration;

use rand::Rng;

/// Reconnection schedule for the push channel: exponential backoff with
/// full jitter, capped per wait and in number of consecutive attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up. 0 means never give up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Upper bound of the wait before attempt `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u64 << exp;
        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let ms = base_ms.saturating_mul(factor);
        Duration::from_millis(ms).min(self.max_delay)
    }

    /// Jittered wait before attempt `attempt`, or `None` once exhausted.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Option<Duration> {
        if self.max_attempts != 0 && attempt > self.max_attempts {
            return None;
        }
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Some(Duration::ZERO);
        }
        Some(Duration::from_millis(rng.gen_range(0..=ceiling)))
    }
}
