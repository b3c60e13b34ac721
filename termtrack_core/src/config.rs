//! Registry tuning knobs

use crate::constants::{
    DEFAULT_CAPACITY, DEFAULT_HASH_BITS, DEFAULT_TTL_SECS, MAX_CAPACITY, MAX_HASH_BITS,
};
use crate::errors::Error;
use serde::Deserialize;
use std::time::Duration;

/// Set once at construction; the registry never re-reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Idle interval between expiry checks.
    pub ttl_secs: u64,
    /// Maximum number of live terminals.
    pub capacity: usize,
    /// log2 of the bucket count.
    pub hash_bits: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            capacity: DEFAULT_CAPACITY,
            hash_bits: DEFAULT_HASH_BITS,
        }
    }
}

impl TrackerConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if self.capacity > MAX_CAPACITY {
            return Err(Error::InvalidConfig(format!(
                "capacity must be at most {MAX_CAPACITY}, got {}",
                self.capacity
            )));
        }
        if self.ttl_secs == 0 {
            return Err(Error::InvalidConfig("ttl_secs must be greater than 0".into()));
        }
        if self.hash_bits == 0 || self.hash_bits > MAX_HASH_BITS {
            return Err(Error::InvalidConfig(format!(
                "hash_bits must be in 1..={MAX_HASH_BITS}, got {}",
                self.hash_bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.ttl(), Duration::from_secs(60));
        assert_eq!(cfg.hash_bits, 8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        let base = TrackerConfig::default();
        assert_eq!(TrackerConfig { capacity: 0, ..base }.validate(), Err(Error::ZeroCapacity));
        assert!(TrackerConfig { ttl_secs: 0, ..base }.validate().is_err());
        assert!(TrackerConfig { hash_bits: 0, ..base }.validate().is_err());
        assert!(TrackerConfig { hash_bits: 17, ..base }.validate().is_err());
    }

    #[test]
    fn oversized_pool_is_a_config_error() {
        let base = TrackerConfig::default();
        assert!(TrackerConfig { capacity: MAX_CAPACITY, ..base }.validate().is_ok());
        assert!(matches!(
            TrackerConfig { capacity: MAX_CAPACITY + 1, ..base }.validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            TrackerConfig { capacity: u32::MAX as usize, ..base }.validate(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
