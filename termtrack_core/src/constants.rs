//! Constants and defaults for the terminal registry

/// Hardware address length in bytes.
pub const ETH_ALEN: usize = 6;

/// Idle interval of the reference policy, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// log2 of the bucket count (256 buckets).
pub const DEFAULT_HASH_BITS: u8 = 8;
pub const MAX_HASH_BITS: u8 = 16;

pub const DEFAULT_CAPACITY: usize = 4_096;
/// Upper bound on the record pool; the pool is reserved whole at startup.
pub const MAX_CAPACITY: usize = 1 << 20;

/// Control writes longer than this are truncated, not rejected.
pub const CMD_MAX_LEN: usize = 128;

/// Mixed into the hash seed, as jhash does.
pub const JHASH_INITVAL: u32 = 0xdeadbeef;
