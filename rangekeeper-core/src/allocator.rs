//! Scatter allocation of free units.
//!
//! Free units are taken from the gaps between reservations, lowest first,
//! until the request is satisfied. No randomization and no best-fit packing:
//! the same reserved space and count always yield the same allocation.

use crate::error::{RangeError, Result};
use crate::interval_set::ReservedSpace;
use crate::range::{UnitId, UnitRange};
use serde::{Deserialize, Serialize};

/// The outcome of a scatter allocation.
///
/// `primary` is the first allocated unit; `spares` covers the remaining
/// units as ascending contiguous runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// The distinguished unit split off the first run.
    pub primary: UnitId,
    /// The other allocated units.
    pub spares: Vec<UnitRange>,
}

impl Allocation {
    /// Every allocated range, the primary unit first.
    pub fn ranges(&self) -> impl Iterator<Item = UnitRange> + '_ {
        std::iter::once(UnitRange::single(self.primary)).chain(self.spares.iter().copied())
    }

    /// Total number of allocated units.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        1 + self.spares.iter().map(UnitRange::len).sum::<u64>()
    }
}

/// Find `count` free units in `space` without reserving them.
///
/// Fails with `InvalidRequest` for a zero count and `CapacityExceeded` when
/// the universe does not hold enough free units; nothing partial is ever
/// returned. The caller reserves [`Allocation::ranges`] in the same
/// transaction.
pub fn allocate(space: &ReservedSpace, count: u32) -> Result<Allocation> {
    if count == 0 {
        return Err(RangeError::InvalidRequest {
            cause: "at least one unit must be requested".to_string(),
        });
    }

    let mut remaining = count;
    let mut runs = Vec::new();
    for gap in space.gaps() {
        // `remaining` is non-zero and the gap holds at least one unit.
        let take = remaining.min(gap.hi() - gap.lo() + 1);
        runs.push(UnitRange::new_unchecked(gap.lo(), gap.lo() + take - 1));
        remaining -= take;
        if remaining == 0 {
            break;
        }
    }

    if remaining > 0 {
        return Err(RangeError::CapacityExceeded {
            requested: count,
            available: space.free_units(),
        });
    }

    let first = runs.remove(0);
    if first.lo() < first.hi() {
        runs.insert(0, UnitRange::new_unchecked(first.lo() + 1, first.hi()));
    }

    tracing::debug!(
        count,
        primary = first.lo(),
        spare_runs = runs.len(),
        "Allocated units"
    );

    Ok(Allocation {
        primary: first.lo(),
        spares: runs,
    })
}
