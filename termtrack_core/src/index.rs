//! Seeded hash index: MAC -> bucket of slot handles

use crate::helpers::jhash_1word;
use crate::types::{MacAddr, SlotId};

pub struct HashIndex {
    seed: u32,
    mask: u32,
    buckets: Vec<Vec<SlotId>>,
}

impl HashIndex {
    /// `bits` must already be validated; the table has `1 << bits` buckets.
    pub fn new(bits: u8, seed: u32) -> Self {
        let n = 1usize << bits;
        Self {
            seed,
            mask: (n - 1) as u32,
            buckets: (0..n).map(|_| Vec::new()).collect(),
        }
    }

    #[inline]
    pub fn bucket_of(&self, mac: &MacAddr) -> usize {
        (jhash_1word(mac.hash_word(), self.seed) & self.mask) as usize
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, b: usize) -> &[SlotId] {
        &self.buckets[b]
    }

    pub fn link(&mut self, b: usize, id: SlotId) {
        self.buckets[b].push(id);
    }

    pub fn unlink(&mut self, b: usize, id: SlotId) -> bool {
        let chain = &mut self.buckets[b];
        match chain.iter().position(|&x| x == id) {
            Some(pos) => {
                chain.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
    }
}
