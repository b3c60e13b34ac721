//! Per-terminal idle timers.
//!
//! Every terminal gets one tokio task that sleeps a TTL and then takes the
//! registry write lock:
//!
//! * `RECENTLY_ACTIVE` set   -> clear it and sleep another TTL (demote)
//! * `RECENTLY_ACTIVE` clear -> unlink and free the terminal (evict)
//!
//! The task only knows its [`SlotId`] and a weak pointer to the registry, and
//! re-validates the id under the lock before touching anything. A firing that
//! lost the race against `clear_all` therefore finds a stale id and exits.

use crate::types::{Flags, SlotId};
use crate::Inner;
use log::{info, trace};
use metrics::{counter, gauge};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::task::AbortHandle;

/// Outcome of one timer firing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tick {
    Demoted,
    Evicted,
    /// The terminal was already gone.
    Stale,
}

// Keeps `Inner::armed` honest: dropped when the task ends or is aborted.
struct ArmedGuard(Arc<AtomicUsize>);

impl Drop for ArmedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Spawn the expiry task for `id`. Caller holds the write lock and stores
/// the returned handle in the terminal.
pub(crate) fn arm(inner: &Arc<Inner>, id: SlotId) -> AbortHandle {
    let weak = Arc::downgrade(inner);
    let ttl = inner.config.ttl();
    inner.armed.fetch_add(1, Ordering::AcqRel);
    let guard = ArmedGuard(Arc::clone(&inner.armed));

    inner
        .runtime
        .spawn(async move {
            let _guard = guard;
            loop {
                tokio::time::sleep(ttl).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if fire(&inner, id) != Tick::Demoted {
                    return;
                }
            }
        })
        .abort_handle()
}

/// Rearm-or-destroy decision, taken under one write-lock acquisition.
pub(crate) fn fire(inner: &Inner, id: SlotId) -> Tick {
    let mut table = inner.table.write();

    let Some(term) = table.arena.get_mut(id) else {
        trace!("[EXPIRY] slot {} already gone", id.index());
        return Tick::Stale;
    };
    if term.flags.contains(Flags::RECENTLY_ACTIVE) {
        term.flags.remove(Flags::RECENTLY_ACTIVE);
        trace!("[EXPIRY] {} idle, rearming", term.mac);
        return Tick::Demoted;
    }

    // The timer is this very task; dropping its handle does not abort it.
    if let Some(term) = table.remove(id) {
        counter!("termtrack_evictions_total").increment(1);
        gauge!("termtrack_terminals").set(table.arena.len() as f64);
        info!("[EXPIRY] evicted {} ({})", term.mac, term.ip);
    }
    Tick::Evicted
}

#[cfg(test)]
mod tests {
    use crate::config::TrackerConfig;
    use crate::types::MacAddr;
    use crate::Registry;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::time::sleep;

    const TTL: u64 = 60;

    fn registry() -> Registry {
        Registry::new(TrackerConfig {
            ttl_secs: TTL,
            capacity: 128,
            hash_bits: 4,
        })
        .unwrap()
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }

    #[tokio::test(start_paused = true)]
    async fn first_firing_only_demotes() {
        let reg = registry();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();

        sleep(Duration::from_secs(TTL + 1)).await;
        let view = reg.lookup(&mac(1)).expect("survives one ttl");
        assert!(!view.is_recently_active());
        assert_eq!(reg.armed_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_idle_firing_evicts() {
        let reg = registry();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();

        sleep(Duration::from_secs(2 * TTL + 1)).await;
        assert!(reg.lookup(&mac(1)).is_none());
        assert!(reg.is_empty());
        assert_eq!(reg.armed_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_while_idle_cancels_eviction() {
        let reg = registry();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();

        sleep(Duration::from_secs(TTL + 1)).await;
        reg.mark_active(&mac(1)).unwrap();
        sleep(Duration::from_secs(TTL)).await;
        // demoted again at 2*TTL instead of evicted
        let view = reg.lookup(&mac(1)).expect("activity kept it alive");
        assert!(!view.is_recently_active());

        sleep(Duration::from_secs(TTL)).await;
        assert!(reg.lookup(&mac(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_counts_as_activity() {
        let reg = registry();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();
        // stay half a period out of phase with the timer
        sleep(Duration::from_secs(TTL / 2)).await;
        for _ in 0..5 {
            sleep(Duration::from_secs(TTL)).await;
            reg.account(&mac(1), 1500, 40).unwrap();
        }
        let view = reg.lookup(&mac(1)).unwrap();
        assert_eq!(view.flow.rx, 7500);
        assert_eq!(view.flow.tx, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_does_not_keep_terminal_alive() {
        let reg = registry();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();
        reg.set_authenticated(&mac(1), true).unwrap();

        sleep(Duration::from_secs(2 * TTL + 1)).await;
        assert!(!reg.is_authenticated(&mac(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_aborts_every_timer() {
        let reg = registry();
        for i in 0..50 {
            reg.insert(mac(i), Ipv4Addr::new(10, 0, 0, i)).unwrap();
        }
        assert_eq!(reg.armed_timers(), 50);

        assert_eq!(reg.clear_all(), 50);
        // let the runtime reap the aborted tasks
        sleep(Duration::from_millis(1)).await;
        assert_eq!(reg.armed_timers(), 0);

        // a re-inserted MAC gets a fresh timer and the old ones never fire
        reg.insert(mac(0), Ipv4Addr::LOCALHOST).unwrap();
        sleep(Duration::from_secs(TTL + 1)).await;
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.armed_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_registry_stops_timers() {
        let reg = registry();
        let counter = std::sync::Arc::clone(&reg.inner.armed);
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();
        drop(reg);
        sleep(Duration::from_millis(1)).await;
        assert_eq!(counter.load(std::sync::atomic::Ordering::Acquire), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_id_fires_as_noop() {
        let reg = registry();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();
        let id = {
            let table = reg.inner.table.read();
            table.find(&mac(1)).unwrap()
        };
        reg.clear_all();
        reg.insert(mac(1), Ipv4Addr::LOCALHOST).unwrap();
        assert_eq!(super::fire(&reg.inner, id), super::Tick::Stale);
        assert!(reg.lookup(&mac(1)).unwrap().is_recently_active());
    }
}
