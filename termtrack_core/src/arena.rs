//! Fixed-capacity slot arena with generation-tagged handles.
//!
//! Slots are handed out from a bump index first and from the freelist once
//! records start dying. The arena has a single owner (the registry table,
//! behind its write lock), so the freelist is a plain stack. Every free
//! bumps the slot generation, so a stale [`SlotId`] held by a timer that
//! lost a race never resolves to the record that reused its slot.

use crate::errors::Error;
use crate::types::SlotId;
use log::{trace, warn};
use metrics::counter;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    freelist: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl<T> Arena<T> {
    /// Reserve the whole pool up front so inserts never reallocate. A pool
    /// the allocator cannot provide is reported, not fatal.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if capacity > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!("capacity {capacity} too large")));
        }
        let mut slots = Vec::new();
        let mut freelist = Vec::new();
        if let Err(e) = slots
            .try_reserve_exact(capacity)
            .and_then(|()| freelist.try_reserve_exact(capacity))
        {
            counter!("termtrack_alloc_failures_total").increment(1);
            warn!("[ARENA] cannot reserve {} slots: {}", capacity, e);
            return Err(Error::CapacityExceeded);
        }
        Ok(Self {
            slots,
            freelist,
            capacity,
            live: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn available(&self) -> usize {
        self.capacity - self.live
    }

    pub fn alloc(&mut self, value: T) -> Result<SlotId, Error> {
        if let Some(index) = self.freelist.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            self.live += 1;
            trace!("[ARENA] reused slot {} gen {}", index, slot.generation);
            return Ok(SlotId::new(index, slot.generation));
        }
        if self.slots.len() >= self.capacity {
            counter!("termtrack_alloc_failures_total").increment(1);
            warn!("[ARENA] pool exhausted ({} slots)", self.capacity);
            return Err(Error::CapacityExceeded);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.live += 1;
        Ok(SlotId::new(index, 0))
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Take the value out and retire the handle. `None` for stale ids, so a
    /// slot can only ever be freed once per generation.
    pub fn free(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.live -= 1;
        self.freelist.push(id.index());
        Some(value)
    }

    /// Free every live slot, handing each value to `f`.
    pub fn drain_with(&mut self, mut f: impl FnMut(T)) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.freelist.push(index as u32);
                f(value);
            }
        }
        self.live = 0;
    }
}
