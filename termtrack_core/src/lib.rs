pub mod admin;
pub mod arena;
pub mod config;
pub mod constants;
pub mod errors;
pub mod expiry;
pub mod helpers;
pub mod index;
pub mod telemetry;
pub mod types;

use arena::Arena;
use config::TrackerConfig;
use errors::Error;
use index::HashIndex;
use log::{debug, error, info};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockReadGuard};
use std::{
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::runtime::Handle;
use types::{Flags, MacAddr, SlotId, Terminal, TerminalView};

pub use admin::{control_write, parse_command, render_listing, Command};

/// Index and record pool; only ever touched through the registry lock.
pub(crate) struct Table {
    index: HashIndex,
    arena: Arena<Terminal>,
}

impl Table {
    fn find(&self, mac: &MacAddr) -> Option<SlotId> {
        let b = self.index.bucket_of(mac);
        self.index
            .bucket(b)
            .iter()
            .copied()
            .find(|&id| self.arena.get(id).is_some_and(|t| t.mac == *mac))
    }

    fn get_by_mac(&self, mac: &MacAddr) -> Option<&Terminal> {
        self.find(mac).and_then(|id| self.arena.get(id))
    }

    fn get_mut_by_mac(&mut self, mac: &MacAddr) -> Option<&mut Terminal> {
        let id = self.find(mac)?;
        self.arena.get_mut(id)
    }

    /// Unlink from the bucket and free the slot. The only way a record dies.
    fn remove(&mut self, id: SlotId) -> Option<Terminal> {
        let mac = self.arena.get(id)?.mac;
        let b = self.index.bucket_of(&mac);
        if !self.index.unlink(b, id) {
            error!("[REMOVE] slot {} missing from bucket {}", id.index(), b);
        }
        self.arena.free(id)
    }

    fn clear(&mut self) -> usize {
        let mut dropped = 0;
        self.arena.drain_with(|mut term| {
            term.cancel_timer();
            dropped += 1;
        });
        self.index.clear();
        dropped
    }
}

pub(crate) struct Inner {
    config: TrackerConfig,
    table: RwLock<Table>,
    runtime: Handle,
    armed: Arc<AtomicUsize>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let dropped = self.table.get_mut().clear();
        debug!("[TEARDOWN] released {} terminals", dropped);
    }
}

/// Concurrent terminal registry.
///
/// Cloning is cheap and every clone refers to the same table. Readers
/// (`lookup`, `is_authenticated`, `enumerate`) share one reader/writer lock
/// with writers (`insert`, flag changes, `clear_all`) and with the expiry
/// timers, so every view handed out is a consistent copy.
///
/// Each terminal owns a timer task on the tokio runtime given at
/// construction. A terminal with no activity signal lives between one and
/// two TTLs: the first firing only clears `RECENTLY_ACTIVE`, the second
/// one evicts.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    // ---- logging bootstraper -------------------------------------------------
    fn ensure_logging() {
        static INIT: OnceCell<()> = OnceCell::new();
        INIT.get_or_init(|| {
            let _ = env_logger::builder()
                .format_timestamp(None)
                .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
                .try_init();
        });
    }

    /// Build a registry on the ambient tokio runtime.
    pub fn new(config: TrackerConfig) -> Result<Self, Error> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Build a registry whose expiry timers run on `runtime`. Picks a fresh
    /// hash seed and reserves the whole record pool.
    pub fn with_runtime(config: TrackerConfig, runtime: Handle) -> Result<Self, Error> {
        Self::ensure_logging();
        telemetry::init();
        config.validate()?;

        let table = Table {
            index: HashIndex::new(config.hash_bits, rand::random::<u32>()),
            arena: Arena::with_capacity(config.capacity)?,
        };
        info!(
            "[INIT] ttl={}s capacity={} buckets={}",
            config.ttl_secs,
            config.capacity,
            table.index.bucket_count()
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                table: RwLock::new(table),
                runtime,
                armed: Arc::new(AtomicUsize::new(0)),
            }),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Copy of the terminal's state, or `None` if it is not tracked.
    pub fn lookup(&self, mac: &MacAddr) -> Option<TerminalView> {
        let table = self.inner.table.read();
        table.get_by_mac(mac).map(Terminal::view)
    }

    /// Packet-path check. Unknown terminals are simply not authorized.
    pub fn is_authenticated(&self, mac: &MacAddr) -> bool {
        let table = self.inner.table.read();
        table
            .get_by_mac(mac)
            .is_some_and(|t| t.flags.contains(Flags::AUTHENTICATED))
    }

    pub fn set_authenticated(&self, mac: &MacAddr, authed: bool) -> Result<(), Error> {
        let mut table = self.inner.table.write();
        let term = table.get_mut_by_mac(mac).ok_or(Error::NotFound)?;
        term.flags.set(Flags::AUTHENTICATED, authed);
        debug!("[MARK] {} authed={}", mac, authed);
        Ok(())
    }

    /// Track a terminal and arm its expiry timer.
    ///
    /// Inserting a MAC that is already tracked updates it in place: the IP is
    /// refreshed and the terminal counts as active again, while flags,
    /// counters, creation time and the running timer are kept.
    pub fn insert(&self, mac: MacAddr, ip: Ipv4Addr) -> Result<(), Error> {
        counter!("termtrack_inserts_total").increment(1);
        let mut table = self.inner.table.write();

        if let Some(term) = table.get_mut_by_mac(&mac) {
            term.ip = ip;
            term.flags.insert(Flags::RECENTLY_ACTIVE);
            debug!("[INSERT] {} already tracked, ip={}", mac, ip);
            return Ok(());
        }

        let id = match table.arena.alloc(Terminal::new(mac, ip)) {
            Ok(id) => id,
            Err(e) => {
                error!("[INSERT] dropping {}: {}", mac, e);
                return Err(e);
            }
        };
        let b = table.index.bucket_of(&mac);
        table.index.link(b, id);
        let timer = expiry::arm(&self.inner, id);
        if let Some(term) = table.arena.get_mut(id) {
            term.timer = Some(timer);
        }
        gauge!("termtrack_terminals").set(table.arena.len() as f64);
        info!("[INSERT] mac={} ip={} slot={}", mac, ip, id.index());
        Ok(())
    }

    /// Activity signal from the packet path; postpones eviction.
    pub fn mark_active(&self, mac: &MacAddr) -> Result<(), Error> {
        let mut table = self.inner.table.write();
        let term = table.get_mut_by_mac(mac).ok_or(Error::NotFound)?;
        term.flags.insert(Flags::RECENTLY_ACTIVE);
        Ok(())
    }

    /// Add observed traffic to the counters. Traffic implies activity.
    pub fn account(&self, mac: &MacAddr, rx: u64, tx: u64) -> Result<(), Error> {
        let mut table = self.inner.table.write();
        let term = table.get_mut_by_mac(mac).ok_or(Error::NotFound)?;
        term.flow.rx = term.flow.rx.saturating_add(rx);
        term.flow.tx = term.flow.tx.saturating_add(tx);
        term.flags.insert(Flags::RECENTLY_ACTIVE);
        Ok(())
    }

    /// Cancel every timer and drop every terminal. Returns how many went.
    pub fn clear_all(&self) -> usize {
        info!("[CLEAR] Clearing terminal table.");
        let mut table = self.inner.table.write();
        let dropped = table.clear();
        gauge!("termtrack_terminals").set(0.0);
        info!("[CLEAR] {} terminals dropped.", dropped);
        dropped
    }

    /// Walk every terminal under one read lock, held until the iterator is
    /// dropped. Writers wait for it, so the walk sees a single snapshot.
    pub fn enumerate(&self) -> Terminals<'_> {
        Terminals {
            table: self.inner.table.read(),
            bucket: 0,
            pos: 0,
        }
    }

    pub fn snapshot(&self) -> Vec<TerminalView> {
        self.enumerate().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.table.read().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available_capacity(&self) -> usize {
        self.inner.table.read().arena.available()
    }

    /// Expiry tasks that are still scheduled. Equals `len()` once every
    /// aborted task has been reaped by the runtime.
    pub fn armed_timers(&self) -> usize {
        self.inner.armed.load(Ordering::Acquire)
    }
}

/// Lazy, lock-holding walk over the table. See [`Registry::enumerate`].
pub struct Terminals<'a> {
    table: RwLockReadGuard<'a, Table>,
    bucket: usize,
    pos: usize,
}

impl Iterator for Terminals<'_> {
    type Item = TerminalView;

    fn next(&mut self) -> Option<TerminalView> {
        while self.bucket < self.table.index.bucket_count() {
            match self.table.index.bucket(self.bucket).get(self.pos) {
                Some(&id) => {
                    self.pos += 1;
                    if let Some(term) = self.table.arena.get(id) {
                        return Some(term.view());
                    }
                }
                None => {
                    self.bucket += 1;
                    self.pos = 0;
                }
            }
        }
        None
    }
}

// Public module for C API functions
pub mod public_api;

// Re-export all public API functions at the crate root
pub use public_api::*;
