//! Eviction engine (§4.6): memory-pressure-driven key selection plus
//! accounting, sharing one work-item pool with the persistence engine's
//! scheduled flushes.

use crate::config::EvictionConfig;

/// Consecutive-failure budget before a memory-pressure eviction pass
/// gives up to avoid spinning (§4.6: "> 16").
pub const MAX_CONSECUTIVE_FAILS: u32 = 16;

/// Outcome of a single `tryEvictKey` attempt (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The key was submitted for a swap-out and the value stays resident
    /// (warm).
    Swapped,
    /// The key was fully evicted, freeing its in-memory value.
    Freed,
    /// The key isn't present (already gone).
    Absent,
    /// The key was already evicted.
    AlreadyEvicted,
    /// The key's lock would block; deferred to a future pass.
    Swapping,
    /// The key's type doesn't support eviction.
    Unsupported,
}

/// Running counters for one eviction pass, keyed by outcome (§4.6
/// "accounting").
#[derive(Debug, Default, Clone, Copy)]
pub struct EvictionStats {
    /// Count of [`EvictOutcome::Swapped`].
    pub succ_swapped: u64,
    /// Count of [`EvictOutcome::Freed`].
    pub succ_freed: u64,
    /// Count of [`EvictOutcome::Absent`].
    pub fail_absent: u64,
    /// Count of [`EvictOutcome::AlreadyEvicted`].
    pub fail_evicted: u64,
    /// Count of [`EvictOutcome::Swapping`].
    pub fail_swapping: u64,
    /// Count of [`EvictOutcome::Unsupported`].
    pub fail_unsupported: u64,
}

impl EvictionStats {
    fn record(&mut self, outcome: EvictOutcome) {
        match outcome {
            EvictOutcome::Swapped => self.succ_swapped += 1,
            EvictOutcome::Freed => self.succ_freed += 1,
            EvictOutcome::Absent => self.fail_absent += 1,
            EvictOutcome::AlreadyEvicted => self.fail_evicted += 1,
            EvictOutcome::Swapping => self.fail_swapping += 1,
            EvictOutcome::Unsupported => self.fail_unsupported += 1,
        }
    }

    fn is_success(outcome: EvictOutcome) -> bool {
        matches!(outcome, EvictOutcome::Swapped | EvictOutcome::Freed)
    }
}

/// Computes the effective maxmemory after applying
/// `maxmemory_scaledown_rate` (`maxmemory_scale_from`, §4.6).
pub fn effective_maxmemory(maxmemory: u64, cfg: &EvictionConfig) -> u64 {
    ((maxmemory as f64) * cfg.maxmemory_scaledown_rate) as u64
}

/// Bytes that must be freed to get back under the effective maxmemory
/// (`mem_tofree`, §4.6). Zero if already under budget.
pub fn mem_to_free(used_memory: u64, maxmemory: u64, cfg: &EvictionConfig) -> u64 {
    let effective = effective_maxmemory(maxmemory, cfg);
    used_memory.saturating_sub(effective)
}

/// The in-progress eviction limit for the current pass, scaling with how
/// far `used_memory` has overshot the effective maxmemory (§4.6).
pub fn inprogress_limit(used_memory: u64, maxmemory: u64, cfg: &EvictionConfig) -> usize {
    let overshoot = mem_to_free(used_memory, maxmemory, cfg) as f64;
    if cfg.inprogress_growth_rate <= 0.0 {
        return cfg.inprogress_limit;
    }
    cfg.inprogress_limit + (overshoot / cfg.inprogress_growth_rate) as usize
}

/// Runs one eviction pass over `candidates` (already ordered by the
/// host's key-selection policy, e.g. LFU/LRU), calling `try_evict` for
/// each up to `limit` attempts or until [`MAX_CONSECUTIVE_FAILS`]
/// consecutive failures (§4.6).
pub fn run_pass<F>(candidates: &[Vec<u8>], limit: usize, mut try_evict: F) -> EvictionStats
where
    F: FnMut(&[u8]) -> EvictOutcome,
{
    let mut stats = EvictionStats::default();
    let mut consecutive_fails = 0u32;
    for key in candidates.iter().take(limit) {
        let outcome = try_evict(key);
        stats.record(outcome);
        if EvictionStats::is_success(outcome) {
            consecutive_fails = 0;
        } else {
            consecutive_fails += 1;
            if consecutive_fails > MAX_CONSECUTIVE_FAILS {
                break;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_to_free_is_zero_under_budget() {
        let cfg = EvictionConfig::default();
        assert_eq!(mem_to_free(50, 100, &cfg), 0);
    }

    #[test]
    fn mem_to_free_scales_with_scaledown_rate() {
        let cfg = EvictionConfig { maxmemory_scaledown_rate: 0.8, ..Default::default() };
        assert_eq!(mem_to_free(90, 100, &cfg), 10);
    }

    #[test]
    fn inprogress_limit_grows_with_overshoot() {
        let cfg = EvictionConfig { inprogress_limit: 1, inprogress_growth_rate: 10.0, ..Default::default() };
        assert_eq!(inprogress_limit(100, 100, &cfg), 1);
        assert_eq!(inprogress_limit(150, 100, &cfg), 1 + 5);
    }

    #[test]
    fn run_pass_stops_after_consecutive_failures() {
        let candidates: Vec<Vec<u8>> = (0..100).map(|i| vec![i as u8]).collect();
        let mut calls = 0u32;
        let stats = run_pass(&candidates, 100, |_| {
            calls += 1;
            EvictOutcome::Absent
        });
        assert_eq!(calls, MAX_CONSECUTIVE_FAILS + 1);
        assert_eq!(stats.fail_absent as u32, calls);
    }

    #[test]
    fn run_pass_resets_fail_counter_on_success() {
        let candidates: Vec<Vec<u8>> = (0..50).map(|i| vec![i as u8]).collect();
        let mut i = 0u32;
        let stats = run_pass(&candidates, 50, |_| {
            i += 1;
            if i % 2 == 0 {
                EvictOutcome::Swapped
            } else {
                EvictOutcome::Absent
            }
        });
        assert_eq!(stats.succ_swapped, 25);
        assert_eq!(stats.fail_absent, 25);
    }
}
