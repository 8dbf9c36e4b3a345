//! Rate limiting (§4.6): protects clients with a bounded pause, or
//! rejects writes outright, when memory or persistence-lag overshoot a
//! configured threshold.

use crate::config::{RateLimitConfig, RateLimitPolicy};

/// Upper bound on a PAUSE rate-limit pause, in milliseconds (§4.6).
pub const MAX_PAUSE_MS: u64 = 200;

/// What a rate-limit check decided for the current client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// No limiting in effect.
    Allow,
    /// Protect the client for this many milliseconds, then allow it.
    Pause(u64),
    /// Reject because the command would exceed memory and is deny-oom.
    RejectOom,
    /// Reject unconditionally.
    RejectAll,
}

fn pause_ms(overshoot: f64, growth_rate: f64) -> u64 {
    if overshoot <= 0.0 || growth_rate <= 0.0 {
        return 0;
    }
    ((overshoot / growth_rate) as u64).min(MAX_PAUSE_MS)
}

/// Decides the rate-limit action for a write, given current memory usage
/// as a percentage of maxmemory and the current persistence lag in
/// milliseconds (§4.6).
pub fn decide(cfg: &RateLimitConfig, used_memory_pct: f64, persist_lag_ms: u64) -> RateLimitDecision {
    match cfg.policy {
        RateLimitPolicy::Disabled => RateLimitDecision::Allow,
        RateLimitPolicy::RejectAll
            if used_memory_pct > cfg.maxmemory_percentage || persist_lag_ms > cfg.persist_lag =>
        {
            RateLimitDecision::RejectAll
        }
        RateLimitPolicy::RejectOom if used_memory_pct > cfg.maxmemory_percentage => RateLimitDecision::RejectOom,
        RateLimitPolicy::Pause => {
            let mem_overshoot = used_memory_pct - cfg.maxmemory_percentage;
            let lag_overshoot = persist_lag_ms.saturating_sub(cfg.persist_lag) as f64;
            let mem_pause = pause_ms(mem_overshoot, cfg.pause_growth_rate);
            let lag_pause = pause_ms(lag_overshoot, cfg.persist_pause_growth_rate);
            let total = mem_pause.max(lag_pause);
            if total == 0 {
                RateLimitDecision::Allow
            } else {
                tracing::warn!(pause_ms = total, mem_overshoot, lag_overshoot, "rate-limit pause armed");
                RateLimitDecision::Pause(total)
            }
        }
        _ => RateLimitDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_always_allows() {
        let cfg = RateLimitConfig { policy: RateLimitPolicy::Disabled, ..Default::default() };
        assert_eq!(decide(&cfg, 500.0, 100_000), RateLimitDecision::Allow);
    }

    #[test]
    fn pause_is_capped_at_200ms() {
        let cfg = RateLimitConfig {
            policy: RateLimitPolicy::Pause,
            maxmemory_percentage: 100.0,
            pause_growth_rate: 1.0,
            ..Default::default()
        };
        match decide(&cfg, 1000.0, 0) {
            RateLimitDecision::Pause(ms) => assert_eq!(ms, MAX_PAUSE_MS),
            other => panic!("expected Pause, got {other:?}"),
        }
    }

    #[test]
    fn reject_oom_above_threshold() {
        let cfg = RateLimitConfig { policy: RateLimitPolicy::RejectOom, maxmemory_percentage: 90.0, ..Default::default() };
        assert_eq!(decide(&cfg, 95.0, 0), RateLimitDecision::RejectOom);
        assert_eq!(decide(&cfg, 50.0, 0), RateLimitDecision::Allow);
    }

    #[test]
    fn under_threshold_allows() {
        let cfg = RateLimitConfig {
            policy: RateLimitPolicy::Pause,
            maxmemory_percentage: 90.0,
            persist_lag: 1000,
            ..Default::default()
        };
        assert_eq!(decide(&cfg, 50.0, 0), RateLimitDecision::Allow);
    }
}
