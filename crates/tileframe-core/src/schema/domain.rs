//! Row dimension: layout mode, declared domain, observed extent and ranges.

use std::{
    fmt,
    ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo},
};

use serde::{Deserialize, Serialize};

/// Storage layout of an array. Immutable after creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArrayMode {
    /// Every written row carries a value (possibly null) for every column.
    Dense,
    /// Any subset of `(row, column)` cells may be populated.
    Sparse,
}

impl fmt::Display for ArrayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayMode::Dense => write!(f, "dense"),
            ArrayMode::Sparse => write!(f, "sparse"),
        }
    }
}

/// Declared range of valid row indices. Rows always start at 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    /// Closed domain: rows `0..=max_row`.
    Bounded {
        /// Largest valid row index (inclusive).
        max_row: u64,
    },
    /// Growable domain; appends may use any row up to [`Domain::FULL_MAX_ROW`].
    Full,
}

impl Domain {
    /// Largest row index accepted by a full domain. One below `u64::MAX` so
    /// the row count `max + 1` always fits.
    pub const FULL_MAX_ROW: u64 = u64::MAX - 1;

    /// A closed domain covering rows `0..=max_row`.
    pub fn bounded(max_row: u64) -> Self {
        Domain::Bounded {
            max_row: max_row.min(Self::FULL_MAX_ROW),
        }
    }

    /// A growable domain.
    pub fn full() -> Self {
        Domain::Full
    }

    /// Largest row index this domain accepts.
    pub fn max_row(&self) -> u64 {
        match self {
            Domain::Bounded { max_row } => *max_row,
            Domain::Full => Self::FULL_MAX_ROW,
        }
    }

    /// Whether `row` lies inside the domain.
    pub fn contains(&self, row: u64) -> bool {
        row <= self.max_row()
    }

    /// True for [`Domain::Full`].
    pub fn is_full(&self) -> bool {
        matches!(self, Domain::Full)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Bounded { max_row } => write!(f, "[0, {max_row}]"),
            Domain::Full => write!(f, "[0, +inf)"),
        }
    }
}

/// Smallest and largest populated row index (both inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Smallest populated row.
    pub min: u64,
    /// Largest populated row.
    pub max: u64,
}

impl Extent {
    /// Extent covering a single row.
    pub fn single(row: u64) -> Self {
        Extent { min: row, max: row }
    }

    /// Smallest extent covering both `self` and `other`.
    pub fn union(self, other: Extent) -> Extent {
        Extent {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Merge an optional extent with another.
    pub fn merge(current: Option<Extent>, other: Extent) -> Extent {
        match current {
            Some(e) => e.union(other),
            None => other,
        }
    }
}

/// Half-open row range `[start, end)`; either bound may be open.
///
/// An open start means "from row 0", an open end means "through the last
/// populated row".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    /// Inclusive lower bound.
    pub start: Option<u64>,
    /// Exclusive upper bound.
    pub end: Option<u64>,
}

impl RowRange {
    /// The unbounded range.
    pub fn all() -> Self {
        RowRange::default()
    }

    /// `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        RowRange {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Exactly one row.
    pub fn single(row: u64) -> Self {
        RowRange {
            start: Some(row),
            end: Some(row.saturating_add(1)),
        }
    }

    /// Resolve against the observed extent.
    ///
    /// The extent only fills in open ends when choosing which tiles to
    /// visit; rows are filtered by the caller's bounds alone, so an open end
    /// keeps every row of the last visited tile. Returns `None` when the
    /// range is empty, or when it has an open end and nothing is written.
    pub fn resolve(&self, extent: Option<Extent>) -> Option<ResolvedRange> {
        let start = self.start.unwrap_or(0);
        if self.end.is_some_and(|end| end <= start) {
            return None;
        }
        let scan_first = match (self.start, extent) {
            (Some(s), _) => s,
            (None, Some(e)) => e.min,
            (None, None) => 0,
        };
        let scan_last = match (self.end, extent) {
            (Some(end), _) => end - 1,
            (None, Some(e)) => e.max,
            (None, None) => return None,
        };
        Some(ResolvedRange {
            scan_first,
            scan_last,
            start,
            end: self.end,
        })
    }
}

/// A [`RowRange`] ready for scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// A row in the first tile to visit.
    pub scan_first: u64,
    /// A row in the last tile to visit.
    pub scan_last: u64,
    /// Inclusive lower row bound.
    pub start: u64,
    /// Exclusive upper row bound, if any.
    pub end: Option<u64>,
}

impl ResolvedRange {
    /// True when `row` lies within the caller's bounds.
    pub fn contains(&self, row: u64) -> bool {
        row >= self.start && self.end.is_none_or(|end| row < end)
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(s), Some(e)) => write!(f, "[{s}, {e})"),
            (Some(s), None) => write!(f, "[{s}, ..)"),
            (None, Some(e)) => write!(f, "[.., {e})"),
            (None, None) => write!(f, "[..]"),
        }
    }
}

impl From<Range<u64>> for RowRange {
    fn from(r: Range<u64>) -> Self {
        RowRange::new(r.start, r.end)
    }
}

impl From<RangeInclusive<u64>> for RowRange {
    fn from(r: RangeInclusive<u64>) -> Self {
        RowRange {
            start: Some(*r.start()),
            end: r.end().checked_add(1),
        }
    }
}

impl From<RangeFrom<u64>> for RowRange {
    fn from(r: RangeFrom<u64>) -> Self {
        RowRange {
            start: Some(r.start),
            end: None,
        }
    }
}

impl From<RangeTo<u64>> for RowRange {
    fn from(r: RangeTo<u64>) -> Self {
        RowRange {
            start: None,
            end: Some(r.end),
        }
    }
}

impl From<RangeFull> for RowRange {
    fn from(_: RangeFull) -> Self {
        RowRange::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_bounds() {
        let d = Domain::bounded(9);
        assert!(d.contains(9));
        assert!(!d.contains(10));
        assert!(Domain::full().contains(1 << 40));
        assert!(!Domain::full().contains(u64::MAX));
    }

    #[test]
    fn domain_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Domain::bounded(3)).unwrap();
        assert_eq!(json, r#"{"kind":"bounded","max_row":3}"#);
        let back: Domain = serde_json::from_str(r#"{"kind":"full"}"#).unwrap();
        assert_eq!(back, Domain::Full);
    }

    #[test]
    fn open_ends_use_the_extent_to_pick_tiles() {
        let extent = Some(Extent { min: 2, max: 10 });
        let all = RowRange::all().resolve(extent).unwrap();
        assert_eq!((all.scan_first, all.scan_last), (2, 10));
        assert!(all.contains(0));
        assert!(all.contains(11));

        let tail = RowRange::from(5..).resolve(extent).unwrap();
        assert_eq!((tail.scan_first, tail.scan_last), (5, 10));
        assert!(!tail.contains(4));
        assert!(tail.contains(12));

        let head = RowRange::from(..3).resolve(extent).unwrap();
        assert_eq!((head.scan_first, head.scan_last), (2, 2));
        assert!(!head.contains(3));
    }

    #[test]
    fn explicit_bounds_are_never_clamped_to_the_extent() {
        let r = RowRange::new(0, 3).resolve(Some(Extent { min: 0, max: 1 })).unwrap();
        assert_eq!((r.scan_first, r.scan_last), (0, 2));
        assert!(r.contains(2));
        assert!(!r.contains(3));

        let r = RowRange::from(3..=3).resolve(None).unwrap();
        assert_eq!((r.scan_first, r.scan_last), (3, 3));
        assert!(r.contains(3));
    }

    #[test]
    fn empty_ranges_resolve_to_none() {
        let extent = Some(Extent { min: 2, max: 10 });
        assert_eq!(RowRange::new(5, 5).resolve(extent), None);
        assert_eq!(RowRange::new(6, 2).resolve(extent), None);
        assert_eq!(RowRange::from(..0).resolve(extent), None);
        assert_eq!(RowRange::all().resolve(None), None);
        assert_eq!(RowRange::from(4..).resolve(None), None);
    }

    #[test]
    fn extent_merge() {
        let e = Extent::merge(None, Extent::single(4));
        assert_eq!(e, Extent { min: 4, max: 4 });
        let e = Extent::merge(Some(e), Extent { min: 1, max: 2 });
        assert_eq!(e, Extent { min: 1, max: 4 });
    }
}
