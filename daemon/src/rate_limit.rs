use governor::{clock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::config::RateLimitConfig;

/// Token bucket guarding the control socket against command floods.
pub struct CommandRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, clock::DefaultClock>,
    enabled: bool,
}

impl CommandRateLimiter {
    /// Zero rates are clamped to one.
    pub fn new(commands_per_second: u32, burst_capacity: u32, enabled: bool) -> Self {
        let quota = Quota::per_second(Self::non_zero(commands_per_second))
            .allow_burst(Self::non_zero(burst_capacity));

        Self {
            limiter: RateLimiter::direct(quota),
            enabled,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.commands_per_second,
            config.burst_capacity,
            config.enabled,
        )
    }

    /// Immediate check, never waits for a token.
    pub fn check(&self) -> bool {
        if !self.enabled {
            return true;
        }

        self.limiter.check().is_ok()
    }

    fn non_zero(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter = CommandRateLimiter::new(1, 1, false);
        for _ in 0..100 {
            assert!(limiter.check());
        }
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = CommandRateLimiter::new(10, 20, true);

        for _ in 0..20 {
            assert!(limiter.check(), "Burst capacity should allow 20 requests");
        }

        assert!(!limiter.check(), "Should be rate limited after burst exhausted");
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig {
            commands_per_second: 1,
            burst_capacity: 2,
            enabled: true,
        };
        let limiter = CommandRateLimiter::from_config(&config);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }

    #[test]
    fn test_zero_rates_are_clamped() {
        let limiter = CommandRateLimiter::new(0, 0, true);
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
