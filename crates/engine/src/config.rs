//! Swap subsystem configuration (§6 Environment, §10.3): one `SwapConfig`
//! struct with `Default`, serde (de)serialization, and typed validation —
//! nothing here reaches into process-global mutable state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use coldtier_storage::BitsPerTag;

/// Rate-limit policy applied when a write would exceed memory or
/// persistence-lag thresholds (§4.6, §6).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Pause the offending client for up to 200ms.
    #[default]
    Pause,
    /// Reject deny-oom commands only.
    RejectOom,
    /// Reject all write commands.
    RejectAll,
    /// No rate limiting.
    Disabled,
}

/// Cuckoo filter tunables (§6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuckooFilterConfig {
    /// Whether the cold-key cuckoo filter is in use at all.
    pub enabled: bool,
    /// Bits-per-tag variant, one of {8, 12, 16, 32}.
    pub bits_per_tag: u8,
    /// Expected key count, used to size the first table.
    pub estimated_keys: usize,
}

impl Default for CuckooFilterConfig {
    fn default() -> Self {
        CuckooFilterConfig { enabled: true, bits_per_tag: 16, estimated_keys: 1_000_000 }
    }
}

impl CuckooFilterConfig {
    /// Resolves `bits_per_tag` into the typed enum the storage crate
    /// expects.
    pub fn bits_per_tag(&self) -> Result<BitsPerTag, ConfigError> {
        match self.bits_per_tag {
            8 => Ok(BitsPerTag::Eight),
            12 => Ok(BitsPerTag::Twelve),
            16 => Ok(BitsPerTag::Sixteen),
            32 => Ok(BitsPerTag::ThirtyTwo),
            other => Err(ConfigError::InvalidValue {
                field: "cuckoo_filter.bits_per_tag",
                reason: format!("must be one of 8, 12, 16, 32; got {other}"),
            }),
        }
    }
}

/// Absent-key/absent-subkey cache tunables (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsentCacheConfig {
    /// Whether the absent cache is in use.
    pub enabled: bool,
    /// Capacity, in entries, of the absent cache.
    pub capacity: usize,
}

impl Default for AbsentCacheConfig {
    fn default() -> Self {
        AbsentCacheConfig { enabled: true, capacity: 100_000 }
    }
}

/// Persistence-engine tunables (§4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Whether background persistence is enabled at all.
    pub enabled: bool,
    /// Lag, in milliseconds, above which `inprogress_limit` starts growing.
    pub lag_millis: u64,
    /// Growth rate divisor applied to lag overshoot.
    pub inprogress_growth_rate: f64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        PersistConfig { enabled: true, lag_millis: 1000, inprogress_growth_rate: 100.0 }
    }
}

/// Memory-pressure eviction tunables (§4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Base in-progress eviction limit before scaling by overshoot.
    pub inprogress_limit: usize,
    /// Growth rate divisor applied to memory overshoot.
    pub inprogress_growth_rate: f64,
    /// Fraction (0..1) to scale maxmemory down by before comparing against
    /// used memory (`maxmemory_scale_from` / `maxmemory_scaledown_rate`).
    pub maxmemory_scaledown_rate: f64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfig { inprogress_limit: 1, inprogress_growth_rate: 100.0, maxmemory_scaledown_rate: 1.0 }
    }
}

/// Rate-limit tunables (§4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Which policy to apply.
    pub policy: RateLimitPolicy,
    /// Percentage of maxmemory above which rate limiting engages.
    pub maxmemory_percentage: f64,
    /// Growth rate divisor for the memory-overshoot pause duration.
    pub pause_growth_rate: f64,
    /// Persistence lag, in milliseconds, above which rate limiting engages.
    pub persist_lag: u64,
    /// Growth rate divisor for the persist-lag pause duration.
    pub persist_pause_growth_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            policy: RateLimitPolicy::default(),
            maxmemory_percentage: 100.0,
            pause_growth_rate: 100.0,
            persist_lag: 2000,
            persist_pause_growth_rate: 100.0,
        }
    }
}

/// Batch-feeder tunables (§4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Default batch size before a forced flush.
    pub default_size: usize,
    /// Size above which batches grow linearly rather than doubling.
    pub linear_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { default_size: 20, linear_size: 128 }
    }
}

/// Replication worker-pool tunables (§4.8, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Worker-client pool size (default 256 reserved clients).
    pub workers: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig { workers: 256 }
    }
}

/// Top-level swap-subsystem configuration (§6, §10.3). Constructible from
/// `Default`, from a TOML table via [`SwapConfig::from_toml_str`], or
/// field-by-field; validated by [`SwapConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SwapConfig {
    /// Cuckoo filter tunables.
    pub cuckoo_filter: CuckooFilterConfig,
    /// Absent-cache tunables.
    pub absent_cache: AbsentCacheConfig,
    /// Persistence-engine tunables.
    pub persist: PersistConfig,
    /// Eviction tunables.
    pub eviction: EvictionConfig,
    /// Rate-limit tunables.
    pub ratelimit: RateLimitConfig,
    /// Batch-feeder tunables.
    pub batch: BatchConfig,
    /// Replication worker-pool tunables.
    pub repl: ReplicationConfig,
    /// Bits reserved for the session id within a meta-scan cursor (§6);
    /// the remainder of the non-flag bits are the session sequence.
    pub scan_session_bits: u8,
}

/// A `SwapConfig` field failed validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `field` holds a value outside its allowed domain.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted config-field path.
        field: &'static str,
        /// Why the value is invalid.
        reason: String,
    },
}

impl SwapConfig {
    /// Parses a `SwapConfig` from a TOML document, falling back to
    /// per-field defaults for anything the document omits.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::InvalidValue { field: "<root>", reason: e.to_string() })
    }

    /// Checks cross-field and domain constraints not expressible in the
    /// type system alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cuckoo_filter.bits_per_tag()?;
        if self.scan_session_bits >= 63 {
            return Err(ConfigError::InvalidValue {
                field: "scan_session_bits",
                reason: "must leave room for the cursor flag and session sequence bits".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.ratelimit.maxmemory_percentage) {
            return Err(ConfigError::InvalidValue {
                field: "ratelimit.maxmemory_percentage",
                reason: "must be a percentage in [0, 100]".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        SwapConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_bits_per_tag_rejected() {
        let mut cfg = SwapConfig::default();
        cfg.cuckoo_filter.bits_per_tag = 7;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_toml_round_trip_overrides_only_given_fields() {
        let cfg = SwapConfig::from_toml_str(
            r#"
            [cuckoo_filter]
            bits_per_tag = 32
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cuckoo_filter.bits_per_tag, 32);
        assert_eq!(cfg.cuckoo_filter.enabled, CuckooFilterConfig::default().enabled);
        assert_eq!(cfg.batch, BatchConfig::default());
    }
}
