//! Fixed-capacity zoned slot store
//!
//! One backing array split into four contiguous zones, always in this order:
//!
//! ```text
//! 0          fixed_top      dynamic_top      free_top        N
//! | Fixed    | Dynamic      | Free           | Pending       |
//! ```
//!
//! An entry's state is its zone, so moving an entry between states is a
//! matter of moving it between zones. Fixed and Dynamic grow upward, Pending
//! grows downward, and both eat into Free. Removal swaps the victim with the
//! zone's boundary entry and shrinks the zone; nothing is ever shifted except
//! when the Fixed zone changes size, which rolls the whole Dynamic zone by
//! one slot so that Fixed stays at the low end.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Fixed,
    Dynamic,
    Free,
    Pending,
}

#[derive(Debug, Clone)]
pub struct ZonedStore<T, const N: usize> {
    slots: [T; N],
    fixed_top: usize,
    dynamic_top: usize,
    free_top: usize,
}

impl<T: Copy + Default, const N: usize> ZonedStore<T, N> {
    pub fn new() -> Self {
        Self {
            slots: [T::default(); N],
            fixed_top: 0,
            dynamic_top: 0,
            free_top: N,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn range(&self, zone: Zone) -> Range<usize> {
        match zone {
            Zone::Fixed => 0..self.fixed_top,
            Zone::Dynamic => self.fixed_top..self.dynamic_top,
            Zone::Free => self.dynamic_top..self.free_top,
            Zone::Pending => self.free_top..N,
        }
    }

    /// Fixed and Dynamic together; contiguous by construction
    pub fn resolved_range(&self) -> Range<usize> {
        0..self.dynamic_top
    }

    pub fn len(&self, zone: Zone) -> usize {
        self.range(zone).len()
    }

    pub fn has_free(&self) -> bool {
        self.dynamic_top < self.free_top
    }

    pub fn zone_of(&self, idx: usize) -> Zone {
        if idx < self.fixed_top {
            Zone::Fixed
        } else if idx < self.dynamic_top {
            Zone::Dynamic
        } else if idx < self.free_top {
            Zone::Free
        } else {
            Zone::Pending
        }
    }

    pub fn get(&self, idx: usize) -> &T {
        &self.slots[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        &mut self.slots[idx]
    }

    /// First index in `range` whose entry satisfies `pred`
    pub fn position(&self, range: Range<usize>, pred: impl Fn(&T) -> bool) -> Option<usize> {
        range.into_iter().find(|&i| pred(&self.slots[i]))
    }

    /// Search every occupied zone (everything but Free)
    pub fn position_occupied(&self, pred: impl Fn(&T) -> bool) -> Option<usize> {
        self.position(self.resolved_range(), &pred)
            .or_else(|| self.position(self.range(Zone::Pending), &pred))
    }

    pub fn iter(&self, zone: Zone) -> impl Iterator<Item = &T> {
        self.slots[self.range(zone)].iter()
    }

    /// Insert into an occupied zone. Returns the new index, or `None` when
    /// there is no Free slot left.
    pub fn push(&mut self, zone: Zone, entry: T) -> Option<usize> {
        if !self.has_free() {
            return None;
        }
        let idx = match zone {
            Zone::Fixed => {
                // Roll Dynamic up by one to open a slot at the top of Fixed.
                self.slots
                    .copy_within(self.fixed_top..self.dynamic_top, self.fixed_top + 1);
                let idx = self.fixed_top;
                self.fixed_top += 1;
                self.dynamic_top += 1;
                idx
            }
            Zone::Dynamic => {
                let idx = self.dynamic_top;
                self.dynamic_top += 1;
                idx
            }
            Zone::Pending => {
                self.free_top -= 1;
                self.free_top
            }
            Zone::Free => return None,
        };
        self.slots[idx] = entry;
        debug_assert!(self.is_consistent());
        Some(idx)
    }

    /// Remove the entry at `idx` and return it.
    ///
    /// The slot is refilled from the zone boundary, so callers scanning a
    /// zone must look at `idx` again after a removal.
    pub fn remove(&mut self, idx: usize) -> T {
        let removed = self.slots[idx];
        match self.zone_of(idx) {
            Zone::Fixed => {
                let last = self.fixed_top - 1;
                self.slots[idx] = self.slots[last];
                self.slots.copy_within(self.fixed_top..self.dynamic_top, last);
                self.fixed_top -= 1;
                self.dynamic_top -= 1;
                self.slots[self.dynamic_top] = T::default();
            }
            Zone::Dynamic => {
                let last = self.dynamic_top - 1;
                self.slots[idx] = self.slots[last];
                self.slots[last] = T::default();
                self.dynamic_top = last;
            }
            Zone::Pending => {
                let first = self.free_top;
                self.slots[idx] = self.slots[first];
                self.slots[first] = T::default();
                self.free_top += 1;
            }
            Zone::Free => {}
        }
        debug_assert!(self.is_consistent());
        removed
    }

    /// Move a Pending entry to the top of the Dynamic zone.
    ///
    /// Removing from Pending frees a slot first, so this cannot fail.
    pub fn promote(&mut self, idx: usize) -> usize {
        debug_assert_eq!(self.zone_of(idx), Zone::Pending);
        let entry = self.remove(idx);
        let new_idx = self.dynamic_top;
        self.slots[new_idx] = entry;
        self.dynamic_top += 1;
        debug_assert!(self.is_consistent());
        new_idx
    }

    /// Drop the most recently inserted Dynamic entry (top of the zone)
    pub fn evict_newest_dynamic(&mut self) -> Option<T> {
        if self.len(Zone::Dynamic) == 0 {
            return None;
        }
        Some(self.remove(self.dynamic_top - 1))
    }

    pub fn is_consistent(&self) -> bool {
        self.fixed_top <= self.dynamic_top && self.dynamic_top <= self.free_top && self.free_top <= N
    }
}

impl<T: Copy + Default, const N: usize> Default for ZonedStore<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
