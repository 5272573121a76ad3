//! Unit ranges and the universe they are drawn from.

use crate::error::{RangeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single reservable integer identifier.
pub type UnitId = u32;

/// An inclusive range of units `[lo, hi]`.
///
/// Persisted as a two-element JSON array `[lo, hi]`. Deserialization rejects
/// `lo > hi`, so a `UnitRange` is never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[UnitId; 2]", into = "[UnitId; 2]")]
pub struct UnitRange {
    lo: UnitId,
    hi: UnitId,
}

impl UnitRange {
    /// Create a range, failing with `InvalidRange` when `lo > hi`.
    pub fn new(lo: UnitId, hi: UnitId) -> Result<Self> {
        if lo > hi {
            return Err(RangeError::InvalidRange { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    /// A range covering exactly one unit.
    #[must_use]
    pub const fn single(unit: UnitId) -> Self {
        Self { lo: unit, hi: unit }
    }

    /// Callers must guarantee `lo <= hi`.
    pub(crate) const fn new_unchecked(lo: UnitId, hi: UnitId) -> Self {
        debug_assert!(lo <= hi);
        Self { lo, hi }
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub const fn lo(&self) -> UnitId {
        self.lo
    }

    /// Upper bound (inclusive).
    #[must_use]
    pub const fn hi(&self) -> UnitId {
        self.hi
    }

    /// Number of units in the range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        (self.hi - self.lo) as u64 + 1
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Whether `unit` lies inside the range.
    #[must_use]
    pub const fn contains(&self, unit: UnitId) -> bool {
        self.lo <= unit && unit <= self.hi
    }

    /// Whether the two ranges share at least one unit.
    #[must_use]
    pub const fn overlaps(&self, other: &UnitRange) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    /// Whether `other` lies entirely inside this range.
    #[must_use]
    pub const fn covers(&self, other: &UnitRange) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    /// Iterate over every unit in the range.
    pub fn units(&self) -> std::ops::RangeInclusive<UnitId> {
        self.lo..=self.hi
    }
}

impl TryFrom<[UnitId; 2]> for UnitRange {
    type Error = RangeError;

    fn try_from([lo, hi]: [UnitId; 2]) -> Result<Self> {
        Self::new(lo, hi)
    }
}

impl From<UnitRange> for [UnitId; 2] {
    fn from(range: UnitRange) -> Self {
        [range.lo, range.hi]
    }
}

impl fmt::Display for UnitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

/// Parses `N` (a single unit) or `LO-HI`.
impl FromStr for UnitRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<UnitId>()
                .map_err(|e| format!("invalid unit '{}': {}", part.trim(), e))
        };
        match s.split_once('-') {
            Some((lo, hi)) => Self::new(parse(lo)?, parse(hi)?).map_err(|e| e.to_string()),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

/// The fixed domain `[min_id, max_id)` units are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UniverseBounds", into = "UniverseBounds")]
pub struct Universe {
    min_id: UnitId,
    max_id: UnitId,
}

/// Serialized form of [`Universe`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct UniverseBounds {
    min_id: UnitId,
    max_id: UnitId,
}

impl Universe {
    /// Create a universe; `max_id` is exclusive and must exceed `min_id`.
    pub fn new(min_id: UnitId, max_id: UnitId) -> Result<Self> {
        if min_id >= max_id {
            return Err(RangeError::ConfigValue {
                field: "universe".to_string(),
                cause: format!("min_id {} must be below max_id {}", min_id, max_id),
            });
        }
        Ok(Self { min_id, max_id })
    }

    /// First unit of the universe.
    #[must_use]
    pub const fn min_id(&self) -> UnitId {
        self.min_id
    }

    /// Exclusive upper bound.
    #[must_use]
    pub const fn max_id(&self) -> UnitId {
        self.max_id
    }

    /// Total number of units.
    #[must_use]
    pub const fn size(&self) -> u64 {
        (self.max_id - self.min_id) as u64
    }

    /// Whether the whole range lies inside the universe.
    #[must_use]
    pub const fn contains(&self, range: &UnitRange) -> bool {
        self.min_id <= range.lo && range.hi < self.max_id
    }

    /// Fail with `OutOfUniverse` unless the range lies inside the universe.
    pub fn check(&self, range: UnitRange) -> Result<()> {
        if self.contains(&range) {
            Ok(())
        } else {
            Err(RangeError::OutOfUniverse {
                range,
                universe: *self,
            })
        }
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self {
            min_id: 9000,
            max_id: 20000,
        }
    }
}

impl TryFrom<UniverseBounds> for Universe {
    type Error = RangeError;

    fn try_from(bounds: UniverseBounds) -> Result<Self> {
        Self::new(bounds.min_id, bounds.max_id)
    }
}

impl From<Universe> for UniverseBounds {
    fn from(universe: Universe) -> Self {
        Self {
            min_id: universe.min_id,
            max_id: universe.max_id,
        }
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min_id, self.max_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_rejects_inverted_bounds() {
        let err = UnitRange::new(5, 4).unwrap_err();
        assert_eq!(err.code(), "E104");
        assert_eq!(UnitRange::new(5, 5).unwrap(), UnitRange::single(5));
    }

    #[test]
    fn range_serializes_as_pair() {
        let range = UnitRange::new(9000, 9005).unwrap();
        assert_eq!(serde_json::to_string(&range).unwrap(), "[9000,9005]");

        let parsed: UnitRange = serde_json::from_str("[7, 8]").unwrap();
        assert_eq!(parsed, UnitRange::new(7, 8).unwrap());

        assert!(serde_json::from_str::<UnitRange>("[8, 7]").is_err());
        assert!(serde_json::from_str::<UnitRange>("[8]").is_err());
    }

    #[test]
    fn range_parses_from_cli_syntax() {
        assert_eq!("42".parse::<UnitRange>().unwrap(), UnitRange::single(42));
        assert_eq!(
            "10-12".parse::<UnitRange>().unwrap(),
            UnitRange::new(10, 12).unwrap()
        );
        assert!("12-10".parse::<UnitRange>().is_err());
        assert!("abc".parse::<UnitRange>().is_err());
        assert!("1-".parse::<UnitRange>().is_err());
    }

    #[test]
    fn range_geometry() {
        let a = UnitRange::new(1, 3).unwrap();
        let b = UnitRange::new(3, 6).unwrap();
        let c = UnitRange::new(4, 6).unwrap();
        assert_eq!(a.len(), 3);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(b.covers(&c));
        assert!(!c.covers(&b));
        assert_eq!(a.units().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn universe_bounds() {
        let universe = Universe::new(1, 11).unwrap();
        assert_eq!(universe.size(), 10);
        assert!(universe.check(UnitRange::new(1, 10).unwrap()).is_ok());
        assert_eq!(
            universe
                .check(UnitRange::new(5, 11).unwrap())
                .unwrap_err()
                .code(),
            "E103"
        );
        assert!(universe.check(UnitRange::single(0)).is_err());
        assert!(Universe::new(5, 5).is_err());
    }

    #[test]
    fn universe_deserialization_validates() {
        let universe: Universe =
            serde_json::from_str(r#"{"min_id": 9000, "max_id": 20000}"#).unwrap();
        assert_eq!(universe, Universe::default());
        assert!(serde_json::from_str::<Universe>(r#"{"min_id": 10, "max_id": 3}"#).is_err());
    }
}
