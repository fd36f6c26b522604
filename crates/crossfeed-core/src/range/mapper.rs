//! Module: range::mapper
//! Responsibility: reconcile prior per-range continuation tokens with the
//! current set of feed ranges after splits and merges.
//! Does not own: token decoding or page enumeration.
//! Boundary: pure functions; every failure is a typed `QueryError`.

use crate::{
    error::{MapperError, QueryError},
    range::EpkRange,
};

///
/// PartitionedToken
///
/// Continuation that remembers the key interval it was produced for.
///

pub trait PartitionedToken {
    fn range(&self) -> &EpkRange;
}

///
/// MappedRange
///
/// One tile of the mapped key space and the token it resumes from, if any.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MappedRange<T> {
    pub range: EpkRange,
    pub token: Option<T>,
}

impl<T> MappedRange<T> {
    const fn unclaimed(range: EpkRange) -> Self {
        Self { range, token: None }
    }
}

///
/// PartitionMapping
///
/// Current ranges split around prior tokens and classified relative to the
/// target (the range of the smallest-starting token). All three parts
/// sorted by start key tile the merged current range set.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionMapping<T> {
    pub left_of_target: Vec<MappedRange<T>>,
    pub target: MappedRange<T>,
    pub right_of_target: Vec<MappedRange<T>>,
}

impl<T> PartitionMapping<T> {
    /// Tiles that still carry a token, in start-key order.
    ///
    /// Tiles without a token were not pending when the continuation was
    /// produced and need no further reads.
    pub fn into_resumable(self) -> Vec<(EpkRange, T)> {
        self.left_of_target
            .into_iter()
            .chain(std::iter::once(self.target))
            .chain(self.right_of_target)
            .filter_map(|tile| tile.token.map(|token| (tile.range, token)))
            .collect()
    }
}

/// Sort ranges by start key and merge each range whose end equals the next
/// range's start.
#[must_use]
pub fn merge_ranges_where_possible(ranges: &[EpkRange]) -> Vec<EpkRange> {
    let mut sorted = ranges
        .iter()
        .filter(|range| !range.is_empty())
        .cloned()
        .collect::<Vec<_>>();
    sorted.sort();

    let mut merged: Vec<EpkRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if last.max == range.min => last.max = range.max,
            _ => merged.push(range),
        }
    }

    merged
}

/// Split each range around the tokens that overlap it.
///
/// A token overlapping no range is orphaned and dropped. A token overlapping
/// more than one range is rejected. The overlapping range is replaced by
/// up to three tiles: the part left of the token, the intersection (which
/// carries the token), and the part right of it.
pub fn split_ranges_by_tokens<T>(
    ranges: &[EpkRange],
    tokens: &[T],
) -> Result<Vec<MappedRange<T>>, QueryError>
where
    T: PartitionedToken + Clone,
{
    let mut tokens = tokens.iter().collect::<Vec<_>>();
    tokens.sort_by(|left, right| left.range().cmp(right.range()));

    let mut tiles = ranges
        .iter()
        .cloned()
        .map(MappedRange::unclaimed)
        .collect::<Vec<_>>();
    tiles.sort_by(|left, right| left.range.cmp(&right.range));

    for token in tokens {
        let token_range = token.range();
        let overlapping = ranges
            .iter()
            .filter(|range| range.overlaps(token_range))
            .count();

        match overlapping {
            0 => {
                tracing::debug!(token = %token_range, "dropping continuation token with no live range");
                continue;
            }
            1 => {}
            overlapping => {
                return Err(QueryError::mapper(MapperError::TokenSpansMultipleRanges {
                    token: token_range.clone(),
                    overlapping,
                }));
            }
        }

        let mut claimed = tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.range.overlaps(token_range));
        let (index, tile) = match (claimed.next(), claimed.next()) {
            (Some((index, tile)), None) if tile.token.is_none() => (index, tile.range.clone()),
            _ => {
                return Err(QueryError::mapper(MapperError::OverlappingTokens {
                    token: token_range.clone(),
                }));
            }
        };

        let Some(intersection) = tile.intersection(token_range) else {
            return Err(QueryError::mapper(MapperError::OverlappingTokens {
                token: token_range.clone(),
            }));
        };

        let mut replacement = Vec::with_capacity(3);
        let left = EpkRange::new(tile.min.clone(), intersection.min.clone());
        if !left.is_empty() {
            replacement.push(MappedRange::unclaimed(left));
        }
        let right = EpkRange::new(intersection.max.clone(), tile.max.clone());
        replacement.push(MappedRange {
            range: intersection,
            token: Some(token.clone()),
        });
        if !right.is_empty() {
            replacement.push(MappedRange::unclaimed(right));
        }

        tiles.splice(index..=index, replacement);
    }

    Ok(tiles)
}

/// Map prior continuation tokens onto the current feed ranges.
///
/// The target is the tile whose interval equals the range of the
/// smallest-starting token. When no tile matches and exactly one tile
/// exists, that tile becomes the target; if it carries no token it takes
/// the first token.
pub fn map_partitions<T>(
    current_ranges: &[EpkRange],
    prior_tokens: &[T],
) -> Result<PartitionMapping<T>, QueryError>
where
    T: PartitionedToken + Clone,
{
    let Some(first) = prior_tokens
        .iter()
        .min_by(|left, right| left.range().cmp(right.range()))
    else {
        return Err(QueryError::mapper(MapperError::NoContinuationTokens));
    };

    let merged = merge_ranges_where_possible(current_ranges);
    let mut tiles = split_ranges_by_tokens(&merged, prior_tokens)?;

    let target_range = first.range();
    let target_index = match tiles.iter().position(|tile| &tile.range == target_range) {
        Some(index) => index,
        None if tiles.len() == 1 => {
            if tiles[0].token.is_none() {
                tiles[0].token = Some(first.clone());
            }
            0
        }
        None => {
            return Err(QueryError::mapper(MapperError::TargetRangeNotFound {
                target: target_range.clone(),
                candidates: tiles.len(),
            }));
        }
    };

    let right_of_target = tiles.split_off(target_index + 1);
    let Some(target) = tiles.pop() else {
        return Err(QueryError::mapper(MapperError::TargetRangeNotFound {
            target: target_range.clone(),
            candidates: 0,
        }));
    };

    Ok(PartitionMapping {
        left_of_target: tiles,
        target,
        right_of_target,
    })
}

/// Subdivide a parent range into the tiles its children now serve.
///
/// Children are clipped to the parent and must tile it exactly; a gap or an
/// overlap means the reported topology is inconsistent.
pub fn split_range_for_children(
    parent: &EpkRange,
    children: &[EpkRange],
) -> Result<Vec<EpkRange>, QueryError> {
    let mut tiles = children
        .iter()
        .filter_map(|child| child.intersection(parent))
        .collect::<Vec<_>>();
    tiles.sort();

    let not_covered = || {
        QueryError::mapper(MapperError::ChildRangesDoNotCover {
            parent: parent.clone(),
        })
    };

    let (Some(first), Some(last)) = (tiles.first(), tiles.last()) else {
        return Err(not_covered());
    };
    if first.min != parent.min || last.max != parent.max {
        return Err(not_covered());
    }
    if tiles.windows(2).any(|pair| pair[0].max != pair[1].min) {
        return Err(not_covered());
    }

    Ok(tiles)
}
