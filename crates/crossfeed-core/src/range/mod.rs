//! Module: range
//! Responsibility: effective-partition-key intervals and the feed ranges
//! built on them.
//! Does not own: feed range wire descriptors (see `token::feed_range`).

pub mod mapper;


use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest effective partition key.
pub const MIN_EPK: &str = "";

/// Exclusive upper bound of the effective partition key space.
pub const MAX_EPK: &str = "FF";

///
/// EpkRange
///
/// Half-open effective-partition-key interval `[min, max)`.
/// Ordered by `(min, max)`.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct EpkRange {
    pub min: String,
    pub max: String,
}

impl EpkRange {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// The whole key space.
    #[must_use]
    pub fn full() -> Self {
        Self::new(MIN_EPK, MAX_EPK)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.min.as_str() <= key && key < self.max.as_str()
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.min < other.max && other.min < self.max
    }

    /// Overlapping part of two ranges, `None` when they are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }

        Some(Self::new(
            self.min.as_str().max(other.min.as_str()),
            self.max.as_str().min(other.max.as_str()),
        ))
    }
}

impl fmt::Display for EpkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.min, self.max)
    }
}

///
/// PartitionKeyRange
///
/// A physical partition: its id and the key interval it currently serves.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionKeyRange {
    pub id: String,
    pub range: EpkRange,
}

impl PartitionKeyRange {
    pub fn new(id: impl Into<String>, range: EpkRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }
}

///
/// FeedRange
///
/// Unit of data a single page enumerator reads from.
/// Logical partition keys never split and expose no interval.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FeedRange {
    Epk(EpkRange),
    PartitionKeyRange(PartitionKeyRange),
    LogicalPartitionKey(Value),
}

impl FeedRange {
    /// Key interval of this feed range, if it has one.
    #[must_use]
    pub const fn epk_range(&self) -> Option<&EpkRange> {
        match self {
            Self::Epk(range) => Some(range),
            Self::PartitionKeyRange(pk_range) => Some(&pk_range.range),
            Self::LogicalPartitionKey(_) => None,
        }
    }

    #[must_use]
    pub const fn is_logical_partition_key(&self) -> bool {
        matches!(self, Self::LogicalPartitionKey(_))
    }

    /// True when both feed ranges would read some of the same documents.
    ///
    /// Intervals are compared by key range whatever their addressing; a
    /// logical partition key only collides with the same key.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::LogicalPartitionKey(left), Self::LogicalPartitionKey(right)) => left == right,
            _ => match (self.epk_range(), other.epk_range()) {
                (Some(left), Some(right)) => left.overlaps(right),
                _ => false,
            },
        }
    }
}

impl From<EpkRange> for FeedRange {
    fn from(range: EpkRange) -> Self {
        Self::Epk(range)
    }
}

impl fmt::Display for FeedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epk(range) => write!(f, "{range}"),
            Self::PartitionKeyRange(pk_range) => write!(f, "{}:{}", pk_range.id, pk_range.range),
            Self::LogicalPartitionKey(pk) => write!(f, "pk={pk}"),
        }
    }
}
