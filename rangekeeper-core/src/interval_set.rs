//! The reserved space: occupied units as a sorted set of disjoint ranges.
//!
//! Between operations a [`ReservedSpace`] always satisfies:
//!
//! 1. every range has `lo <= hi` (guaranteed by [`UnitRange`]),
//! 2. ranges are sorted ascending and pairwise disjoint,
//! 3. consecutive ranges are non-adjacent (`hi[i] + 1 < lo[i + 1]`),
//! 4. every range lies inside the [`Universe`].
//!
//! Neighbour lookup uses binary search over the sorted ranges. `remove`
//! rebuilds the set in a single split pass.

use crate::error::{RangeError, Result};
use crate::range::{UnitId, UnitRange, Universe};
use thiserror::Error;

/// Occupied units of a universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedSpace {
    universe: Universe,
    ranges: Vec<UnitRange>,
}

impl ReservedSpace {
    /// Create an empty reserved space.
    #[must_use]
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            ranges: Vec::new(),
        }
    }

    /// Build a reserved space from persisted ranges, checking invariants 2-4.
    ///
    /// Returns the first violation found; the store wraps it into
    /// `CorruptState` together with the document path.
    pub fn from_ranges(
        universe: Universe,
        ranges: Vec<UnitRange>,
    ) -> std::result::Result<Self, LayoutViolation> {
        if let Some(&range) = ranges.iter().find(|r| !universe.contains(r)) {
            return Err(LayoutViolation::OutsideUniverse { range, universe });
        }
        for pair in ranges.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if prev.hi() >= next.lo() {
                return Err(LayoutViolation::Unordered { prev, next });
            }
            if prev.hi() + 1 == next.lo() {
                return Err(LayoutViolation::Unmerged { prev, next });
            }
        }
        Ok(Self { universe, ranges })
    }

    /// The universe this space belongs to.
    #[must_use]
    pub fn universe(&self) -> Universe {
        self.universe
    }

    /// The reserved ranges, ascending.
    #[must_use]
    pub fn ranges(&self) -> &[UnitRange] {
        &self.ranges
    }

    /// Iterate over the reserved ranges, ascending.
    pub fn iter(&self) -> std::slice::Iter<'_, UnitRange> {
        self.ranges.iter()
    }

    /// Number of disjoint ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether nothing is reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Consume the space, returning its ranges.
    #[must_use]
    pub fn into_ranges(self) -> Vec<UnitRange> {
        self.ranges
    }

    /// Number of reserved units.
    #[must_use]
    pub fn reserved_units(&self) -> u64 {
        self.ranges.iter().map(UnitRange::len).sum()
    }

    /// Number of units still free in the universe.
    #[must_use]
    pub fn free_units(&self) -> u64 {
        self.universe.size() - self.reserved_units()
    }

    /// Whether `unit` is reserved.
    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        let idx = self.ranges.partition_point(|r| r.hi() < unit);
        self.ranges.get(idx).is_some_and(|r| r.contains(unit))
    }

    /// Whether every unit of `range` is reserved.
    ///
    /// Because ranges are never adjacent, a fully reserved range always sits
    /// inside a single entry.
    #[must_use]
    pub fn covers(&self, range: UnitRange) -> bool {
        let idx = self.ranges.partition_point(|r| r.hi() < range.lo());
        self.ranges.get(idx).is_some_and(|r| r.covers(&range))
    }

    /// Reserve `range`, merging it with adjacent reservations.
    ///
    /// Fails with `OverlappingRange` if any unit is already reserved, or
    /// `OutOfUniverse` if the range leaves the universe. The set is left
    /// untouched on failure.
    pub fn insert(&mut self, range: UnitRange) -> Result<()> {
        self.universe.check(range)?;

        // Everything before `at` ends below the new range; everything from
        // `at` onwards ends at or above its lower bound.
        let at = self.ranges.partition_point(|r| r.hi() < range.lo());
        if let Some(&existing) = self.ranges.get(at)
            && existing.lo() <= range.hi()
        {
            return Err(RangeError::OverlappingRange { range, existing });
        }

        let before = at.checked_sub(1).map(|i| self.ranges[i]);
        let after = self.ranges.get(at).copied();
        let joins_before = before.is_some_and(|b| b.hi() + 1 == range.lo());
        let joins_after = after.is_some_and(|a| range.hi() + 1 == a.lo());

        match (before, after, joins_before, joins_after) {
            (Some(b), Some(a), true, true) => {
                self.ranges.remove(at);
                self.ranges[at - 1] = UnitRange::new_unchecked(b.lo(), a.hi());
            }
            (Some(b), _, true, false) => {
                self.ranges[at - 1] = UnitRange::new_unchecked(b.lo(), range.hi());
            }
            (_, Some(a), false, true) => {
                self.ranges[at] = UnitRange::new_unchecked(range.lo(), a.hi());
            }
            _ => self.ranges.insert(at, range),
        }

        tracing::trace!(range = %range, ranges = self.ranges.len(), "Reserved range");
        Ok(())
    }

    /// Release `range`, which must be fully reserved.
    ///
    /// Fails with `NotReserved` (and changes nothing) if any unit of the
    /// range is currently free. Use [`subtract`](Self::subtract) to release
    /// whatever part of a range happens to be reserved.
    pub fn remove(&mut self, range: UnitRange) -> Result<()> {
        if !self.covers(range) {
            return Err(RangeError::NotReserved { range });
        }
        self.subtract(range);
        tracing::trace!(range = %range, ranges = self.ranges.len(), "Released range");
        Ok(())
    }

    /// Remove every reserved unit inside `range`, ignoring units that are free.
    ///
    /// Each intersecting entry is replaced by its left and/or right
    /// remainder; entries outside `range` are kept as they are.
    pub fn subtract(&mut self, range: UnitRange) {
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for &existing in &self.ranges {
            if !existing.overlaps(&range) {
                kept.push(existing);
                continue;
            }
            if existing.lo() < range.lo() {
                kept.push(UnitRange::new_unchecked(existing.lo(), range.lo() - 1));
            }
            if existing.hi() > range.hi() {
                kept.push(UnitRange::new_unchecked(range.hi() + 1, existing.hi()));
            }
        }
        self.ranges = kept;
    }

    /// Reserve a batch of ranges, all or nothing.
    ///
    /// The batch is applied to a scratch copy and swapped in only when every
    /// range succeeds, so a late overlap cannot leave earlier ranges merged.
    pub fn insert_all<I>(&mut self, ranges: I) -> Result<()>
    where
        I: IntoIterator<Item = UnitRange>,
    {
        let mut scratch = self.clone();
        for range in ranges {
            scratch.insert(range)?;
        }
        *self = scratch;
        Ok(())
    }

    /// Release a batch of ranges, all or nothing.
    pub fn remove_all<I>(&mut self, ranges: I) -> Result<()>
    where
        I: IntoIterator<Item = UnitRange>,
    {
        let mut scratch = self.clone();
        for range in ranges {
            scratch.remove(range)?;
        }
        *self = scratch;
        Ok(())
    }

    /// Iterate over the free gaps of the universe, ascending.
    pub fn gaps(&self) -> Gaps<'_> {
        Gaps {
            ranges: self.ranges.iter(),
            cursor: Some(self.universe.min_id()),
            max_id: self.universe.max_id(),
        }
    }
}

/// Why a persisted range list is not a valid reserved space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutViolation {
    /// A range leaves the universe.
    #[error("range {range} lies outside universe {universe}")]
    OutsideUniverse {
        /// Offending range.
        range: UnitRange,
        /// Configured universe.
        universe: Universe,
    },
    /// Two ranges overlap or are out of order.
    #[error("ranges {prev} and {next} overlap or are unsorted")]
    Unordered {
        /// Earlier range in the list.
        prev: UnitRange,
        /// Following range.
        next: UnitRange,
    },
    /// Two ranges touch and should have been merged.
    #[error("ranges {prev} and {next} are adjacent but not merged")]
    Unmerged {
        /// Earlier range in the list.
        prev: UnitRange,
        /// Following range.
        next: UnitRange,
    },
}

/// Iterator over the free ranges between reservations.
#[derive(Debug, Clone)]
pub struct Gaps<'a> {
    ranges: std::slice::Iter<'a, UnitRange>,
    /// Next unit that may be free; `None` once the universe is exhausted.
    cursor: Option<UnitId>,
    max_id: UnitId,
}

impl Iterator for Gaps<'_> {
    type Item = UnitRange;

    fn next(&mut self) -> Option<UnitRange> {
        loop {
            let cursor = self.cursor?;
            match self.ranges.next() {
                Some(reserved) => {
                    self.cursor = Some(reserved.hi() + 1).filter(|c| *c < self.max_id);
                    if reserved.lo() > cursor {
                        return Some(UnitRange::new_unchecked(cursor, reserved.lo() - 1));
                    }
                }
                None => {
                    self.cursor = None;
                    return (cursor < self.max_id)
                        .then(|| UnitRange::new_unchecked(cursor, self.max_id - 1));
                }
            }
        }
    }
}
