//! Module: enumerator
//! Responsibility: merge the pages of many feed ranges into one ordered
//! stream and survive partition splits while doing so.
//! Does not own: how a single page is fetched (see `source`).
//! Boundary: every page carries the resume state of all pending ranges.

mod partition;


pub use partition::PartitionRangePageEnumerator;

use crate::{
    direction::Direction,
    error::{ErrorOrigin, QueryError},
    obs::sink::{self, PipelineEvent},
    range::{FeedRange, mapper::split_range_for_children},
    source::{DataSourcePage, FeedRangeProvider, QueryDataSource},
    token::{CrossFeedRangeState, FeedRangeState},
};
use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};
use tokio_util::sync::CancellationToken;

///
/// CrossPartitionPage
///
/// One data source page plus the resume state of every range still pending
/// after it; `state` is `None` once all ranges are drained.
///

#[derive(Clone, Debug, PartialEq)]
pub struct CrossPartitionPage {
    pub page: DataSourcePage,
    pub feed_range: FeedRange,
    pub state: Option<CrossFeedRangeState>,
}

///
/// QueuedEnumerator
///
/// Heap entry. The greatest entry is read next: logical partition keys
/// first, then by start key in `direction`, then first-enqueued.
///

struct QueuedEnumerator {
    enumerator: PartitionRangePageEnumerator,
    direction: Direction,
    sequence: u64,
}

impl QueuedEnumerator {
    fn start_key(&self) -> Option<&str> {
        self.enumerator
            .feed_range()
            .epk_range()
            .map(|range| range.min.as_str())
    }
}

impl Ord for QueuedEnumerator {
    fn cmp(&self, other: &Self) -> Ordering {
        let logical = self
            .enumerator
            .feed_range()
            .is_logical_partition_key()
            .cmp(&other.enumerator.feed_range().is_logical_partition_key());

        logical
            .then_with(|| {
                let by_start = other.start_key().cmp(&self.start_key());
                if self.direction.is_reverse() {
                    by_start.reverse()
                } else {
                    by_start
                }
            })
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedEnumerator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedEnumerator {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEnumerator {}

///
/// CrossPartitionRangePageEnumerator
///

pub struct CrossPartitionRangePageEnumerator {
    data_source: Arc<dyn QueryDataSource>,
    provider: Arc<dyn FeedRangeProvider>,
    queue: BinaryHeap<QueuedEnumerator>,
    direction: Direction,
    page_size_hint: u32,
    next_sequence: u64,
    current: Option<Result<CrossPartitionPage, QueryError>>,
}

impl CrossPartitionRangePageEnumerator {
    /// Build an enumerator over `ranges`.
    ///
    /// Two states covering the same keys would read them twice, so
    /// overlapping ranges are rejected as a malformed continuation.
    pub fn try_create(
        data_source: Arc<dyn QueryDataSource>,
        provider: Arc<dyn FeedRangeProvider>,
        ranges: Vec<FeedRangeState>,
        direction: Direction,
        page_size_hint: u32,
    ) -> Result<Self, QueryError> {
        for (index, state) in ranges.iter().enumerate() {
            if let Some(earlier) = ranges[..index]
                .iter()
                .find(|earlier| earlier.feed_range.overlaps(&state.feed_range))
            {
                return Err(QueryError::malformed(
                    ErrorOrigin::Enumerator,
                    format!(
                        "feed range {} overlaps feed range {}",
                        state.feed_range, earlier.feed_range
                    ),
                ));
            }
        }

        let mut enumerator = Self {
            data_source,
            provider,
            queue: BinaryHeap::with_capacity(ranges.len()),
            direction,
            page_size_hint,
            next_sequence: 0,
            current: None,
        };
        for state in ranges {
            enumerator.enqueue(PartitionRangePageEnumerator::new(
                state.feed_range,
                state.state,
                page_size_hint,
            ));
        }

        Ok(enumerator)
    }

    #[must_use]
    pub fn pending_ranges(&self) -> usize {
        self.queue.len()
    }

    /// Pull the next page. Returns `false` once every range is drained.
    pub fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        self.current = None;

        loop {
            if cancellation.is_cancelled() {
                self.current = Some(Err(QueryError::cancelled(ErrorOrigin::Enumerator)));
                return true;
            }

            let Some(mut queued) = self.queue.pop() else {
                return false;
            };
            let result = match queued
                .enumerator
                .fetch_next(self.data_source.as_ref(), cancellation)
            {
                None => continue,
                Some(result) => result,
            };

            match result {
                Ok(page) => {
                    sink::record(PipelineEvent::PageFetched {
                        documents: page.documents.len() as u64,
                        request_charge: page.request_charge.get(),
                    });

                    let feed_range = queued.enumerator.feed_range().clone();
                    if !queued.enumerator.is_exhausted() {
                        self.queue.push(queued);
                    }
                    let state = self.pending_state();
                    self.current = Some(Ok(CrossPartitionPage {
                        page,
                        feed_range,
                        state,
                    }));

                    return true;
                }
                Err(err) if err.is_partition_gone() => {
                    if let Err(err) = self.split(queued, err, cancellation) {
                        return self.fail(err);
                    }
                }
                Err(err) => {
                    self.queue.push(queued);
                    return self.fail(err);
                }
            }
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Result<CrossPartitionPage, QueryError>> {
        self.current.as_ref()
    }

    pub const fn take_current(&mut self) -> Option<Result<CrossPartitionPage, QueryError>> {
        self.current.take()
    }

    fn enqueue(&mut self, enumerator: PartitionRangePageEnumerator) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(QueuedEnumerator {
            enumerator,
            direction: self.direction,
            sequence,
        });
    }

    fn fail(&mut self, err: QueryError) -> bool {
        sink::record(PipelineEvent::PageFailed { class: err.class });
        self.current = Some(Err(err));

        true
    }

    // Replace a gone range with its children, each resuming from the
    // parent's state. A range addressed by a partition id that was merged
    // away is readdressed by its key interval. On failure the parent stays
    // queued.
    fn split(
        &mut self,
        queued: QueuedEnumerator,
        gone: QueryError,
        cancellation: &CancellationToken,
    ) -> Result<(), QueryError> {
        let feed_range = queued.enumerator.feed_range().clone();
        let Some(parent) = feed_range.epk_range() else {
            self.queue.push(queued);
            return Err(gone);
        };

        let tiles = match self
            .provider
            .child_ranges(&feed_range, cancellation)
            .and_then(|children| split_range_for_children(parent, &children))
        {
            Ok(tiles) => tiles,
            Err(err) => {
                self.queue.push(queued);
                return Err(err);
            }
        };

        if let [tile] = tiles.as_slice() {
            // Already addressed by interval: the source itself is refusing it.
            if !matches!(feed_range, FeedRange::PartitionKeyRange(_)) {
                self.queue.push(queued);
                return Err(gone);
            }

            tracing::debug!(range = %feed_range, "partition merged; reading by key interval");
            sink::record(PipelineEvent::PartitionMerged);
            self.enqueue(PartitionRangePageEnumerator::new(
                FeedRange::Epk(tile.clone()),
                queued.enumerator.state().cloned(),
                self.page_size_hint,
            ));

            return Ok(());
        }

        tracing::debug!(parent = %parent, children = tiles.len(), "feed range split");
        sink::record(PipelineEvent::PartitionSplit {
            children: tiles.len() as u64,
        });

        let state = queued.enumerator.state().cloned();
        for tile in tiles {
            self.enqueue(PartitionRangePageEnumerator::new(
                FeedRange::Epk(tile),
                state.clone(),
                self.page_size_hint,
            ));
        }

        Ok(())
    }

    fn pending_state(&self) -> Option<CrossFeedRangeState> {
        let mut queued = self.queue.iter().collect::<Vec<_>>();
        queued.sort_by(|left, right| right.cmp(left));

        CrossFeedRangeState::from_pending(
            queued
                .into_iter()
                .map(|entry| entry.enumerator.pending_state())
                .collect(),
        )
    }
}
