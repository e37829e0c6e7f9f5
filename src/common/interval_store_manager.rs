//! A free-list over dense integer ids, handing out the lowest-available id.
//!
//! Grounded on `common/intervalstoremanager.rs`'s `IntervalStoreManager<T>`
//! in the teacher crate: the free set is kept as a small number of maximal
//! `[start, end]` intervals rather than one entry per free id, addressed
//! from the top of two parallel vectors via a `last_in_use` cursor. Taking
//! an id always comes from the *last* interval (lowest ids live in the
//! first interval, so as intervals are exhausted from the top the next
//! lowest-id interval becomes current) and releasing an id first tries to
//! coalesce it onto the top interval's boundary before pushing a new
//! singleton interval.
use std::fmt::Debug;

use crate::errors::{RCFError, Result};
use crate::util::check_argument;

/// A free-list over `[0, capacity)`. Generic over the integer width used to
/// store interval endpoints (the teacher's `IntervalStoreManager<T>` is
/// generic for the same reason a point store's own location table is: a
/// `u16`/`u32` width free list over a bounded capacity saves memory over a
/// `usize` one).
#[repr(C)]
#[derive(Clone)]
pub struct IndexIntervalManager<T> {
    capacity: usize,
    last_in_use: usize,
    free_indices_start: Vec<T>,
    free_indices_end: Vec<T>,
}

impl<T> IndexIntervalManager<T>
where
    T: Copy + TryFrom<usize> + PartialEq,
    usize: From<T>,
    <T as TryFrom<usize>>::Error: Debug,
{
    /// A manager over `[0, capacity)`, with every id initially free.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            return IndexIntervalManager {
                capacity: 0,
                last_in_use: 0,
                free_indices_start: Vec::new(),
                free_indices_end: Vec::new(),
            };
        }
        IndexIntervalManager {
            capacity,
            last_in_use: 1,
            free_indices_start: vec![0.try_into().unwrap()],
            free_indices_end: vec![(capacity - 1).try_into().unwrap()],
        }
    }

    /// Reconstruct a manager from an occupancy map: positions with a
    /// nonzero entry are considered live, positions with a zero entry are
    /// free (spec.md §4.1, "Reconstruct-from-refcounts").
    pub fn reconstruct_from_occupancy(occupancy: &[usize]) -> Self {
        let capacity = occupancy.len();
        let mut manager = IndexIntervalManager {
            capacity,
            last_in_use: 0,
            free_indices_start: Vec::new(),
            free_indices_end: Vec::new(),
        };
        for (index, &count) in occupancy.iter().enumerate() {
            if count == 0 {
                manager.release(index).expect("position within capacity");
            }
        }
        manager
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity
    }

    /// Extend the managed range to `[0, new_capacity)`; the newly added ids
    /// `[old_capacity, new_capacity)` become free. A no-op if
    /// `new_capacity <= capacity`.
    pub fn extend_capacity(&mut self, new_capacity: usize) {
        if new_capacity <= self.capacity {
            return;
        }
        let start: T = self.capacity.try_into().unwrap();
        let end: T = (new_capacity - 1).try_into().unwrap();
        if self.free_indices_start.len() == self.last_in_use {
            self.free_indices_start.push(start);
            self.free_indices_end.push(end);
        } else {
            self.free_indices_start[self.last_in_use] = start;
            self.free_indices_end[self.last_in_use] = end;
        }
        self.last_in_use += 1;
        self.capacity = new_capacity;
    }

    pub fn is_empty(&self) -> bool {
        self.last_in_use == 0
    }

    /// Hand out the smallest free id. Ties are broken by lowest id, which
    /// matters for determinism under a fixed random seed in tests (spec.md
    /// §4.1).
    ///
    /// The teacher's `IntervalStoreManager::get` always pops from the top
    /// of the interval stack, which only returns the globally smallest free
    /// id so long as releases are never interleaved in a way that creates a
    /// lower-starting interval underneath the top one. Since spec.md §4.1
    /// requires the smallest free id unconditionally, this scans the
    /// (normally very small) active interval set for the minimum start
    /// rather than trusting stack order.
    pub fn take_index(&mut self) -> Result<usize> {
        if self.is_empty() {
            log::warn!("take_index failed: interval manager at capacity {}", self.capacity);
            return Err(RCFError::Capacity {
                msg: "no free indices remain in interval manager",
            });
        }
        let mut best = 0usize;
        let mut best_start: usize = self.free_indices_start[0].into();
        for i in 1..self.last_in_use {
            let start: usize = self.free_indices_start[i].into();
            if start < best_start {
                best = i;
                best_start = start;
            }
        }
        let new_value = best_start;
        let end: usize = self.free_indices_end[best].into();
        if new_value == end {
            let last = self.last_in_use - 1;
            self.free_indices_start.swap(best, last);
            self.free_indices_end.swap(best, last);
            self.last_in_use -= 1;
        } else {
            self.free_indices_start[best] = (new_value + 1).try_into().unwrap();
        }
        log::trace!("take_index: handed out {new_value}");
        Ok(new_value)
    }

    /// Release `index` back to the free set. The id must currently be
    /// allocated (not already free) and within `[0, capacity)`.
    pub fn release(&mut self, index: usize) -> Result<()> {
        check_argument(index < self.capacity, "index out of range for release")?;
        let val: T = TryFrom::try_from(index).unwrap();
        if self.last_in_use != 0 {
            let top = self.last_in_use - 1;
            let start: usize = self.free_indices_start[top].into();
            let end: usize = self.free_indices_end[top].into();
            if start == index + 1 {
                self.free_indices_start[top] = val;
                return Ok(());
            } else if end + 1 == index {
                self.free_indices_end[top] = val;
                return Ok(());
            }
        }
        if self.last_in_use < self.free_indices_start.len() {
            self.free_indices_start[self.last_in_use] = val;
            self.free_indices_end[self.last_in_use] = val;
        } else {
            self.free_indices_start.push(val);
            self.free_indices_end.push(val);
        }
        self.last_in_use += 1;
        Ok(())
    }

    /// Number of allocated (non-free) ids.
    pub fn used(&self) -> usize {
        let mut free = 0;
        for i in 0..self.last_in_use {
            let start: usize = self.free_indices_start[i].into();
            let end: usize = self.free_indices_end[i].into();
            free += end - start + 1;
        }
        self.capacity - free
    }

    /// Approximate footprint in bytes, mirroring the teacher's
    /// `IntervalStoreManager::get_size`.
    pub fn size_in_bytes(&self) -> usize {
        self.free_indices_start.len() * 2 * std::mem::size_of::<T>()
            + std::mem::size_of::<Self>()
    }
}
