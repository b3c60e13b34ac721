//! Data structures for the terminal registry

use crate::constants::ETH_ALEN;
use crate::errors::Error;
use crate::helpers::{pack, unpack};
use std::{fmt, net::Ipv4Addr, str::FromStr, time::Duration};
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// 6-byte hardware address, the table key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    pub const fn new(bytes: [u8; ETH_ALEN]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    /// One OUI byte plus the three NIC bytes: the part that actually varies
    /// between devices of the same vendor.
    #[inline]
    pub fn hash_word(&self) -> u32 {
        u32::from_ne_bytes([self.0[2], self.0[3], self.0[4], self.0[5]])
    }
}

impl From<[u8; ETH_ALEN]> for MacAddr {
    fn from(bytes: [u8; ETH_ALEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    /// Six `:`-separated hex octets of one or two digits, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; ETH_ALEN];
        let mut parts = s.split(':');
        for slot in out.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::Malformed(format!("invalid macaddr format: {s}")))?;
            if part.is_empty() || part.len() > 2 {
                return Err(Error::Malformed(format!("invalid macaddr format: {s}")));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| Error::Malformed(format!("invalid macaddr format: {s}")))?;
        }
        if parts.next().is_some() {
            return Err(Error::Malformed(format!("invalid macaddr format: {s}")));
        }
        Ok(Self(out))
    }
}

/// Independent per-terminal boolean states.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const AUTHENTICATED: Flags = Flags(1 << 0);
    pub const RECENTLY_ACTIVE: Flags = Flags(1 << 1);

    pub const fn empty() -> Self {
        Flags(0)
    }

    #[inline]
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn set(&mut self, other: Flags, on: bool) {
        if on {
            self.insert(other)
        } else {
            self.remove(other)
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Aggregate byte counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Flow {
    pub rx: u64,
    pub tx: u64,
}

/// Record handle: slot index plus the slot generation it was issued for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self(pack(index, generation))
    }

    pub fn index(self) -> u32 {
        unpack(self.0).0
    }

    pub fn generation(self) -> u32 {
        unpack(self.0).1
    }
}

/// A tracked client device. Lives only inside the registry arena.
pub(crate) struct Terminal {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub flags: Flags,
    pub flow: Flow,
    pub created_at: Instant,
    pub timer: Option<AbortHandle>,
}

impl Terminal {
    pub fn new(mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self {
            mac,
            ip,
            flags: Flags::RECENTLY_ACTIVE,
            flow: Flow::default(),
            created_at: Instant::now(),
            timer: None,
        }
    }

    pub fn view(&self) -> TerminalView {
        TerminalView {
            mac: self.mac,
            ip: self.ip,
            flags: self.flags,
            flow: self.flow,
            age: self.created_at.elapsed(),
        }
    }

    /// Stop the expiry task; only called on destruction.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Point-in-time copy of a terminal, taken under the read lock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TerminalView {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub flags: Flags,
    pub flow: Flow,
    /// Time since first insertion.
    pub age: Duration,
}

impl TerminalView {
    pub fn is_authenticated(&self) -> bool {
        self.flags.contains(Flags::AUTHENTICATED)
    }

    pub fn is_recently_active(&self) -> bool {
        self.flags.contains(Flags::RECENTLY_ACTIVE)
    }
}
