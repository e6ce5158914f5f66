// The texture atlas manager
//
// Textures referenced by draw commands live in one large DDR region
// and are addressed by byte offset. The engine hands us the same
// lump addresses frame after frame, so (source_key, size) is a
// stable identity we can cache the atlas offset under.
//
// Austin Shafer - 2025
use std::sync::Arc;

use crate::mem::{MemWindow, TEX_ATLAS_SIZE};
use crate::perf::PerfCounters;

/// Atlas offsets are 16 byte aligned for the kernel's burst reads
pub const ATLAS_ALIGN: u32 = 16;
/// Slots in the pointer-offset cache
pub const CACHE_SLOTS: usize = 16384;
/// Linear probe budget before falling back to the full-table pass
pub const PROBE_LIMIT: usize = 64;

#[derive(Debug, Copy, Clone)]
struct Slot {
    s_key: u64,
    s_size: u32,
    s_offset: u32,
    s_valid: bool,
}

const EMPTY_SLOT: Slot = Slot {
    s_key: 0,
    s_size: 0,
    s_offset: 0,
    s_valid: false,
};

/// Outcome of a cache walk
enum Probe {
    /// Found the mapping
    Hit(u32),
    /// Not present, this slot index is free for the insert
    InsertAt(usize),
    /// Not present and no free slot anywhere. The insert will
    /// overwrite the home bucket
    Saturated(usize),
}

/// 64 to 32 bit avalanche hash mixing the pointer bits with the size
fn hash_key(key: u64, size: u32) -> u32 {
    let mut h = key ^ ((size as u64) << 32) ^ (size as u64);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    (h as u32) ^ ((h >> 32) as u32)
}

/// The bump allocator plus pointer-offset cache
///
/// Owned by the command builder. The atlas persists across frames
/// and is reset only on level transition or when the cursor wraps.
pub struct AtlasManager {
    /// Next free byte in the atlas region, always 16 byte aligned
    a_cursor: u32,
    a_slots: Vec<Slot>,
    /// Last lookup fast path: (key, size, offset). The engine often
    /// draws runs of columns from the same lump
    a_last: Option<(u64, u32, u32)>,
    a_perf: Arc<PerfCounters>,
}

impl AtlasManager {
    pub fn new(perf: Arc<PerfCounters>) -> Self {
        Self {
            a_cursor: 0,
            a_slots: vec![EMPTY_SLOT; CACHE_SLOTS],
            a_last: None,
            a_perf: perf,
        }
    }

    /// Full reset at level transition
    pub fn reset(&mut self) {
        self.a_cursor = 0;
        self.clear_cache();
    }

    fn clear_cache(&mut self) {
        for slot in self.a_slots.iter_mut() {
            *slot = EMPTY_SLOT;
        }
        self.a_last = None;
    }

    /// Walk the cache for (key, size)
    ///
    /// Probes up to PROBE_LIMIT slots from the home bucket. Inserts
    /// can land past the probe budget through the second pass, so a
    /// budget-exhausted walk rescans the whole table before giving
    /// up on a match.
    fn probe(&self, key: u64, size: u32) -> Probe {
        let home = (hash_key(key, size) as usize) % CACHE_SLOTS;
        let mut empty = None;

        for i in 0..PROBE_LIMIT {
            let idx = (home + i) % CACHE_SLOTS;
            let slot = &self.a_slots[idx];
            if !slot.s_valid {
                empty = Some(idx);
                break;
            }
            if slot.s_key == key && slot.s_size == size {
                return Probe::Hit(slot.s_offset);
            }
        }

        if let Some(idx) = empty {
            return Probe::InsertAt(idx);
        }

        // Second pass: the whole table, for a match or any empty slot
        for i in 0..CACHE_SLOTS {
            let idx = (home + i) % CACHE_SLOTS;
            let slot = &self.a_slots[idx];
            if !slot.s_valid {
                return Probe::InsertAt(idx);
            }
            if slot.s_key == key && slot.s_size == size {
                return Probe::Hit(slot.s_offset);
            }
        }

        Probe::Saturated(home)
    }

    /// Upload a texture payload, returning its atlas byte offset
    ///
    /// Returns the cached offset when (key, size) was seen before.
    /// The second tuple field reports that the cursor wrapped, which
    /// obliges the caller to invalidate the device-side caches.
    pub fn upload(&mut self, key: u64, data: &[u8], atlas: &MemWindow) -> (u32, bool) {
        let size = data.len() as u32;

        PerfCounters::count(&self.a_perf.pc_cache_lookups);

        if let Some((lkey, lsize, loff)) = self.a_last {
            if lkey == key && lsize == size {
                PerfCounters::count(&self.a_perf.pc_cache_hits);
                return (loff, false);
            }
        }

        let probe = match self.probe(key, size) {
            Probe::Hit(off) => {
                PerfCounters::count(&self.a_perf.pc_cache_hits);
                self.a_last = Some((key, size, off));
                return (off, false);
            }
            miss => miss,
        };
        PerfCounters::count(&self.a_perf.pc_cache_misses);

        // Wrap the cursor when the region is exhausted. Offsets
        // handed out before this point may alias new payloads, so
        // the host cache is cleared and the caller invalidates the
        // on-chip caches.
        let mut wrapped = false;
        if self.a_cursor as usize + size as usize > TEX_ATLAS_SIZE {
            self.a_cursor = 0;
            self.clear_cache();
            wrapped = true;
            PerfCounters::count(&self.a_perf.pc_cache_wraps);
        }

        let offset = self.a_cursor;
        atlas.write_bulk(offset as usize, data);
        PerfCounters::add(&self.a_perf.pc_atlas_upload_bytes, size as u64);
        self.a_cursor = (offset + size + ATLAS_ALIGN - 1) & !(ATLAS_ALIGN - 1);

        // Record the mapping. A wrap invalidated the probe result,
        // so rewalk the now-empty table.
        let probe = if wrapped { self.probe(key, size) } else { probe };
        let new = Slot {
            s_key: key,
            s_size: size,
            s_offset: offset,
            s_valid: true,
        };
        match probe {
            Probe::InsertAt(idx) => {
                self.a_slots[idx] = new;
                PerfCounters::count(&self.a_perf.pc_cache_entries);
            }
            Probe::Saturated(home) => {
                // Forward progress under pathological collisions:
                // the insert still succeeds, the previous tenant of
                // the home bucket will refetch
                self.a_slots[home] = new;
                PerfCounters::count(&self.a_perf.pc_cache_failed_inserts);
            }
            Probe::Hit(_) => unreachable!(),
        }

        self.a_last = Some((key, size, offset));
        (offset, wrapped)
    }

    /// Current bump cursor. Test helper
    #[cfg(test)]
    pub fn cursor(&self) -> u32 {
        self.a_cursor
    }
}
