//! `PointStore`: a flat, compacting numeric arena addressed by stable
//! integer handles, with optional internal shingling and rotated-shingle
//! storage (spec.md §4.2).
//!
//! Grounded on `VectorizedPointStore` in the teacher's `pointstore.rs`: the
//! byte-plus-overflow-map reference counting (`inc_helper`/`dec_helper`),
//! the opportunistic-overlap append path (`ready_to_copy`), and the
//! block-walking `compact()` are all adapted directly from there. Dropped
//! from the teacher: the label/attribute bookkeeping (`labels`,
//! `attributes`, `label_manager`, `attribute_manager` and their paths) —
//! those belong to the sampler/tree layer this crate doesn't implement.
//! Simplified from the teacher: `location` holds a flat float offset
//! directly rather than a `base`-dimension-granularity index, trading the
//! teacher's narrower representable range (useful with a `u16`/`u32`
//! location width) for a simpler implementation; this store always uses
//! `usize` locations.

use std::collections::HashMap;

use crate::contracts::PointStoreContract;
use crate::common::IndexIntervalManager;
use crate::errors::{RCFError, Result};
use crate::types::{Handle, INFEASIBLE};
use crate::util::check_argument;

#[derive(Clone)]
pub struct PointStore {
    dimensions: usize,
    shingle_size: usize,
    base_dimension: usize,
    capacity: usize,
    internal_shingling_enabled: bool,
    internal_rotation_enabled: bool,

    store: Vec<f32>,
    start_free_region: usize,

    location: Vec<usize>,
    reference_count: Vec<u8>,
    ref_count_overflow: HashMap<usize, usize>,
    index_manager: IndexIntervalManager<usize>,

    last_known_shingle: Vec<f32>,
    next_sequence_index: usize,

    entries_seen: u64,
}

impl PointStore {
    /// Construct a point store over `dimensions`-length shingled points (or
    /// `dimensions / shingle_size`-length base updates, if
    /// `internal_shingling_enabled`), holding at most `capacity` live
    /// points at once. `initial_store_size`, if given, preallocates that
    /// many points' worth of flat storage up front; otherwise a small
    /// default is used and the store grows geometrically as needed.
    pub fn new(
        dimensions: usize,
        shingle_size: usize,
        capacity: usize,
        internal_shingling_enabled: bool,
        internal_rotation_enabled: bool,
        initial_store_size: Option<usize>,
    ) -> Result<Self> {
        check_argument(dimensions > 0, "dimensions must be positive")?;
        check_argument(shingle_size > 0, "shingle size must be positive")?;
        check_argument(
            dimensions % shingle_size == 0,
            "shingle size must divide dimensions",
        )?;
        check_argument(capacity > 0, "capacity must be positive")?;
        check_argument(
            !internal_rotation_enabled || internal_shingling_enabled,
            "rotation requires internal shingling",
        )?;

        let initial_points = initial_store_size.unwrap_or_else(|| capacity.min(16)).max(1);

        Ok(PointStore {
            dimensions,
            shingle_size,
            base_dimension: dimensions / shingle_size,
            capacity,
            internal_shingling_enabled,
            internal_rotation_enabled,
            store: vec![0.0; initial_points * dimensions],
            start_free_region: 0,
            location: vec![INFEASIBLE; capacity],
            reference_count: vec![0; capacity],
            ref_count_overflow: HashMap::new(),
            index_manager: IndexIntervalManager::new(capacity),
            last_known_shingle: vec![0.0; dimensions],
            next_sequence_index: 0,
            entries_seen: 0,
        })
    }

    fn check_handle(&self, handle: Handle) -> Result<()> {
        if handle >= self.capacity {
            return Err(RCFError::InvalidHandle {
                msg: "handle out of range",
            });
        }
        if self.reference_count[handle] == 0 {
            return Err(RCFError::InvalidHandle {
                msg: "handle is not currently allocated",
            });
        }
        Ok(())
    }

    fn ref_count(&self, handle: Handle) -> usize {
        let base = self.reference_count[handle] as usize;
        if base == u8::MAX as usize {
            base + self.ref_count_overflow.get(&handle).copied().unwrap_or(0)
        } else {
            base
        }
    }

    fn inc_helper(index: usize, counts: &mut [u8], overflow: &mut HashMap<usize, usize>) {
        if counts[index] == u8::MAX {
            let next = overflow.get(&index).copied().unwrap_or(0) + 1;
            overflow.insert(index, next);
        } else {
            counts[index] += 1;
        }
    }

    fn dec_helper(index: usize, counts: &mut [u8], overflow: &mut HashMap<usize, usize>) {
        if let Some(extra) = overflow.remove(&index) {
            if extra > 1 {
                overflow.insert(index, extra - 1);
            }
        } else {
            counts[index] -= 1;
        }
    }

    /// Whether the tail of the flat store already contains the leading
    /// `dimensions - base_dimension` values of `new_point`, letting `add`
    /// write only the trailing `base_dimension` new values instead of the
    /// full shingle (spec.md §4.2, "opportunistic overlap reuse").
    fn has_opportunistic_overlap(&self, new_point: &[f32]) -> bool {
        if self.shingle_size <= 1 {
            return false;
        }
        let extra = self.dimensions - self.base_dimension;
        if self.start_free_region <= extra {
            return false;
        }
        let idx = self.start_free_region - extra;
        (0..extra).all(|i| self.store[idx + i] == new_point[i])
    }

    /// Fold a `base_dimension`-length update into the shingle an insertion
    /// at sequence ordinal `ordinal` (0-based count of prior internally
    /// shingled appends) would produce, without mutating any state. Shared
    /// by `add` (which then commits the result) and
    /// `transform_to_shingled_point` (which does not).
    fn fold(&self, point: &[f32], ordinal: usize) -> Vec<f32> {
        let base = self.base_dimension;
        let mut new_point = vec![0.0f32; self.dimensions];
        if !self.internal_rotation_enabled {
            new_point[..self.dimensions - base].copy_from_slice(&self.last_known_shingle[base..]);
            new_point[self.dimensions - base..].copy_from_slice(point);
        } else {
            new_point.copy_from_slice(&self.last_known_shingle);
            let offset = (ordinal * base) % self.dimensions;
            new_point[offset..offset + base].copy_from_slice(point);
        }
        new_point
    }

    /// Upper bound on flat storage, in floats: `capacity` points' worth
    /// ordinarily, doubled under rotation to leave headroom for the
    /// alignment padding a compaction cycle may need (spec.md §4.2).
    fn max_store_floats(&self) -> usize {
        let factor = if self.internal_rotation_enabled { 2 } else { 1 };
        factor * self.capacity * self.dimensions
    }

    fn ensure_store_capacity(&mut self, needed: usize) -> Result<()> {
        if self.start_free_region + needed <= self.store.len() {
            return Ok(());
        }
        self.compact()?;
        if self.start_free_region + needed <= self.store.len() {
            return Ok(());
        }
        let max_floats = self.max_store_floats();
        loop {
            if self.store.len() >= max_floats {
                log::warn!(
                    "point store cannot grow past {} floats to satisfy a request for {} more",
                    max_floats,
                    needed
                );
                return Err(RCFError::Capacity {
                    msg: "point store cannot grow further to accept this point",
                });
            }
            let mut new_len = self.store.len() + self.store.len() / 10 + self.dimensions;
            if new_len > max_floats {
                new_len = max_floats;
            }
            log::debug!("growing point store from {} to {} floats", self.store.len(), new_len);
            self.store.resize(new_len, 0.0);
            if self.start_free_region + needed <= self.store.len() {
                return Ok(());
            }
            if new_len == max_floats {
                return Err(RCFError::Capacity {
                    msg: "point store cannot grow further to accept this point",
                });
            }
        }
    }

    /// Compact the flat store, eliminating gaps left by released handles.
    /// Live `(location, handle)` pairs are sorted and walked left to
    /// right, greedily merging overlapping/adjacent `[location, location +
    /// dimensions)` windows into blocks and copying each block down to the
    /// next free position. In rotation mode, a zero-padded gap is inserted
    /// before each block so that every live point's new offset stays
    /// congruent mod `dimensions` to its old one, preserving the
    /// rotation-phase invariant (spec.md §3, §4.2).
    pub fn compact(&mut self) -> Result<()> {
        let mut live: Vec<(usize, Handle)> = self
            .location
            .iter()
            .enumerate()
            .filter(|&(_, &loc)| loc != INFEASIBLE)
            .map(|(h, &loc)| (loc, h))
            .collect();
        live.sort_unstable();
        log::debug!(
            "compacting point store: {} live points, start_free_region {}",
            live.len(),
            self.start_free_region
        );

        let d = self.dimensions;
        let end = live.len();
        let mut fresh_start = 0usize;
        let mut i = 0usize;

        while i < end {
            let block_start = live[i].0;
            let mut block_end = block_start + d;
            let mut j = i + 1;
            while j < end && live[j].0 <= block_end {
                if live[j].0 + d > block_end {
                    block_end = live[j].0 + d;
                }
                j += 1;
            }

            let padding = if self.internal_rotation_enabled {
                (block_start as i64 - fresh_start as i64).rem_euclid(d as i64) as usize
            } else {
                0
            };
            for _ in 0..padding {
                self.store[fresh_start] = 0.0;
                fresh_start += 1;
            }

            let mut k_live = i;
            for k in block_start..block_end {
                self.store[fresh_start] = self.store[k];
                if k_live < j && live[k_live].0 == k {
                    self.location[live[k_live].1] = fresh_start;
                    k_live += 1;
                }
                fresh_start += 1;
            }
            check_argument(k_live == j, "inconsistent block accounting during compaction")?;
            i = j;
        }
        self.start_free_region = fresh_start;
        log::debug!("compaction complete: start_free_region now {}", fresh_start);
        Ok(())
    }
}

impl PointStoreContract for PointStore {
    fn add(&mut self, point: &[f32], _sequence_num: u64) -> Result<Handle> {
        let base = self.base_dimension;

        // `fold` is a pure read of `last_known_shingle`/`next_sequence_index`;
        // committing its result (and advancing the shingle state) is deferred
        // until every fallible step below has succeeded, so a `Capacity`
        // failure leaves no partial mutation visible to the next call
        // (spec.md §5, §7).
        let effective_point: Vec<f32> = if self.internal_shingling_enabled {
            check_argument(point.len() == base, "incorrect length for internally shingled input")?;
            let ordinal = self.next_sequence_index;
            let folded = self.fold(point, ordinal);
            if ordinal + 1 < self.shingle_size {
                self.last_known_shingle.copy_from_slice(&folded);
                self.next_sequence_index += 1;
                self.entries_seen += 1;
                return Ok(INFEASIBLE);
            }
            folded
        } else {
            check_argument(point.len() == self.dimensions, "expecting externally shingled input")?;
            point.to_vec()
        };

        self.ensure_store_capacity(self.dimensions)?;

        if self.index_manager.is_empty() {
            log::warn!("point store add failed: no free handles remain at capacity {}", self.capacity);
            return Err(RCFError::Capacity {
                msg: "point store has no free handles remaining",
            });
        }
        let handle = self.index_manager.take_index()?;
        self.reference_count[handle] = 1;

        if self.internal_shingling_enabled {
            self.last_known_shingle.copy_from_slice(&effective_point);
            self.next_sequence_index += 1;
        }
        self.entries_seen += 1;

        if self.has_opportunistic_overlap(&effective_point) {
            let extra = self.dimensions - base;
            let idx = self.start_free_region - extra;
            self.location[handle] = idx;
            for i in 0..base {
                self.store[self.start_free_region + i] = effective_point[extra + i];
            }
            self.start_free_region += base;
            log::trace!("add: handle {handle} reused overlap at offset {idx}");
        } else {
            if self.internal_rotation_enabled {
                let ordinal = self.next_sequence_index - 1;
                let phase = (ordinal * base) % self.dimensions;
                let padding = (phase as i64 - self.start_free_region as i64)
                    .rem_euclid(self.dimensions as i64) as usize;
                for _ in 0..padding {
                    self.store[self.start_free_region] = 0.0;
                    self.start_free_region += 1;
                }
            }
            self.location[handle] = self.start_free_region;
            for i in 0..self.dimensions {
                self.store[self.start_free_region + i] = effective_point[i];
            }
            self.start_free_region += self.dimensions;
            log::trace!("add: handle {handle} written fresh at offset {}", self.location[handle]);
        }

        Ok(handle)
    }

    fn increment_ref_count(&mut self, handle: Handle) -> Result<()> {
        self.check_handle(handle)?;
        Self::inc_helper(handle, &mut self.reference_count, &mut self.ref_count_overflow);
        Ok(())
    }

    fn decrement_ref_count(&mut self, handle: Handle) -> Result<usize> {
        self.check_handle(handle)?;
        Self::dec_helper(handle, &mut self.reference_count, &mut self.ref_count_overflow);
        let remaining = self.ref_count(handle);
        if remaining == 0 {
            self.index_manager.release(handle)?;
            self.location[handle] = INFEASIBLE;
        }
        Ok(remaining)
    }

    fn get_numeric_vector(&self, handle: Handle) -> Result<Vec<f32>> {
        self.check_handle(handle)?;
        let loc = self.location[handle];
        // `loc % dimensions` (`phase`) is where the *newest* base-dimension
        // chunk sits physically (see `fold`'s rotation branch and `add`'s
        // padding computation). Walking backward from that chunk by
        // `base_dimension` one chunk at a time visits the chunks in
        // newest-to-oldest order, so the oldest chunk — the one that
        // belongs at logical position 0 — sits `dimensions - base_dimension`
        // behind the newest, i.e. at physical offset `phase` plus that much,
        // wrapped mod `dimensions`. `phase` is always a multiple of
        // `base_dimension` and at most `dimensions - base_dimension`, so
        // `dimensions - phase - base_dimension` never underflows.
        let offset = if self.internal_rotation_enabled {
            let phase = loc % self.dimensions;
            self.dimensions - phase - self.base_dimension
        } else {
            0
        };
        let mut result = vec![0.0f32; self.dimensions];
        for i in 0..self.dimensions {
            result[(i + offset) % self.dimensions] = self.store[loc + i];
        }
        Ok(result)
    }

    fn transform_to_shingled_point(&self, point: &[f32]) -> Result<Vec<f32>> {
        check_argument(self.internal_shingling_enabled, "requires internal shingling")?;
        check_argument(point.len() == self.base_dimension, "incorrect length")?;
        Ok(self.fold(point, self.next_sequence_index))
    }

    fn transform_indices(&self, indices: &[usize]) -> Result<Vec<usize>> {
        if !self.internal_shingling_enabled {
            for &x in indices {
                check_argument(x < self.dimensions, "index out of range")?;
            }
            return Ok(indices.to_vec());
        }
        let base = self.base_dimension;
        let mut out = Vec::with_capacity(indices.len());
        for &x in indices {
            check_argument(x < base, "index out of range for base dimension")?;
            if self.internal_rotation_enabled {
                let ordinal = self.next_sequence_index.saturating_sub(1);
                out.push((ordinal * base + x) % self.dimensions);
            } else {
                out.push(self.dimensions - base + x);
            }
        }
        Ok(out)
    }

    fn get_dimensions(&self) -> usize {
        self.dimensions
    }

    fn get_shingle_size(&self) -> usize {
        self.shingle_size
    }

    fn is_internal_rotation_enabled(&self) -> bool {
        self.internal_rotation_enabled
    }

    fn is_internal_shingling_enabled(&self) -> bool {
        self.internal_shingling_enabled
    }

    fn size(&self) -> usize {
        self.index_manager.used()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl PointStore {
    pub fn entries_seen(&self) -> u64 {
        self.entries_seen
    }

    /// Every currently live `(handle, logical vector)` pair, in ascending
    /// handle order. Used by the forest-state mapper to snapshot the point
    /// store's contents (spec.md §4.4).
    pub fn live_points(&self) -> Vec<(Handle, Vec<f32>)> {
        (0..self.capacity)
            .filter(|&h| self.location[h] != INFEASIBLE)
            .map(|h| (h, self.get_numeric_vector(h).expect("checked live above")))
            .collect()
    }

    /// Rebuild a point store directly from a `(handle, logical vector)`
    /// snapshot, preserving handle identity (spec.md §4.4's mapper
    /// round-trip). Each restored handle starts with reference count 1 — a
    /// transient "builder hold" the caller is expected to release (via
    /// [`PointStoreContract::decrement_ref_count`]) once real owners
    /// (rebuilt samplers) have re-incremented it for each ownership they
    /// hold (spec.md §9, "cyclic ownership").
    ///
    /// Restored points all start at rotation phase 0; this is a valid
    /// initial phase assignment (the rotation invariant only requires the
    /// phase recorded at insertion be internally consistent, not any
    /// particular value) and a subsequent [`Self::compact`] preserves it
    /// like any other.
    pub fn from_snapshot(
        dimensions: usize,
        shingle_size: usize,
        capacity: usize,
        internal_shingling_enabled: bool,
        internal_rotation_enabled: bool,
        points: &[(Handle, Vec<f32>)],
        last_known_shingle: Option<Vec<f32>>,
    ) -> Result<Self> {
        check_argument(dimensions > 0, "dimensions must be positive")?;
        check_argument(shingle_size > 0, "shingle size must be positive")?;
        check_argument(
            dimensions % shingle_size == 0,
            "shingle size must divide dimensions",
        )?;
        check_argument(capacity > 0, "capacity must be positive")?;

        let mut occupancy = vec![0usize; capacity];
        let mut store = vec![0.0f32; capacity * dimensions];
        let mut location = vec![INFEASIBLE; capacity];
        let mut reference_count = vec![0u8; capacity];

        for (handle, vector) in points {
            let handle = *handle;
            check_argument(handle < capacity, "handle out of range in snapshot")?;
            check_argument(vector.len() == dimensions, "snapshot vector has wrong dimension")?;
            check_argument(occupancy[handle] == 0, "duplicate handle in snapshot")?;
            occupancy[handle] = 1;
            reference_count[handle] = 1;
            location[handle] = handle * dimensions;
            store[handle * dimensions..(handle + 1) * dimensions].copy_from_slice(vector);
        }

        let mut point_store = PointStore {
            dimensions,
            shingle_size,
            base_dimension: dimensions / shingle_size,
            capacity,
            internal_shingling_enabled,
            internal_rotation_enabled,
            store,
            start_free_region: capacity * dimensions,
            location,
            reference_count,
            ref_count_overflow: HashMap::new(),
            index_manager: IndexIntervalManager::reconstruct_from_occupancy(&occupancy),
            last_known_shingle: last_known_shingle.unwrap_or_else(|| vec![0.0; dimensions]),
            // A restored store is, by construction, past warm-up: the
            // exact original append ordinal is not part of the snapshot,
            // so this restarts the rotation-phase cycle at 0 rather than
            // guessing (spec.md §4.4 is semantic-level only).
            next_sequence_index: shingle_size,
            entries_seen: points.len() as u64,
        };
        point_store.compact()?;
        Ok(point_store)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.store.len() * std::mem::size_of::<f32>()
            + self.location.len() * std::mem::size_of::<usize>()
            + self.reference_count.len()
            + self.ref_count_overflow.len() * 2 * std::mem::size_of::<usize>()
            + self.index_manager.size_in_bytes()
            + std::mem::size_of::<Self>()
    }
}
