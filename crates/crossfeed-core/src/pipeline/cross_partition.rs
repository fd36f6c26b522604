//! Module: pipeline::cross_partition
//! Responsibility: leaf stage reading every feed range of the collection
//! through the cross-partition enumerator.
//! Does not own: split handling during a drain (see `enumerator`).
//! Boundary: on resume, prior range states are remapped onto the current
//! topology before any page is fetched.

use crate::{
    direction::Direction,
    enumerator::CrossPartitionRangePageEnumerator,
    error::{ErrorOrigin, QueryError},
    obs::sink::{self, PipelineEvent, StageKind},
    pipeline::{ExecutionEnvironment, PipelineStage, QueryPage, StageResult},
    range::{EpkRange, mapper::map_partitions},
    source::{FeedRangeProvider, QueryDataSource},
    token::{CrossFeedRangeState, FeedRangeState, QueryState, RangeToken},
    value::Value,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

///
/// CrossPartitionStage
///

pub struct CrossPartitionStage {
    enumerator: CrossPartitionRangePageEnumerator,
    current: Option<StageResult>,
}

impl CrossPartitionStage {
    /// Build the stage over every current feed range, or over the ranges
    /// still pending in `continuation`.
    #[tracing::instrument(level = "debug", skip_all, fields(resumed = continuation.is_some()))]
    pub fn try_create(
        data_source: Arc<dyn QueryDataSource>,
        provider: Arc<dyn FeedRangeProvider>,
        direction: Direction,
        page_size_hint: u32,
        continuation: Option<&Value>,
        cancellation: &CancellationToken,
    ) -> Result<Self, QueryError> {
        let ranges = match continuation {
            None => provider
                .feed_ranges(cancellation)?
                .into_iter()
                .map(FeedRangeState::unstarted)
                .collect(),
            Some(continuation) => {
                let state = CrossFeedRangeState::from_value(continuation)?;
                let ranges = resume_ranges(state, provider.as_ref(), cancellation)?;
                sink::record(PipelineEvent::RangesResumed {
                    ranges: ranges.len() as u64,
                });
                ranges
            }
        };

        sink::record(PipelineEvent::StageCreated {
            stage: StageKind::CrossPartition,
            environment: ExecutionEnvironment::Compute,
            resumed: continuation.is_some(),
        });

        let enumerator = CrossPartitionRangePageEnumerator::try_create(
            data_source,
            provider,
            ranges,
            direction,
            page_size_hint,
        )?;

        Ok(Self {
            enumerator,
            current: None,
        })
    }
}

// Remap interval-bearing states onto the live ranges. Only pieces that
// still carry a token are pending; the rest were drained before the
// continuation was produced. Logical partition keys never move.
fn resume_ranges(
    state: CrossFeedRangeState,
    provider: &dyn FeedRangeProvider,
    cancellation: &CancellationToken,
) -> Result<Vec<FeedRangeState>, QueryError> {
    let (logical, interval): (Vec<_>, Vec<_>) = state
        .into_ranges()
        .into_iter()
        .partition(|range| range.feed_range.is_logical_partition_key());

    let tokens = interval
        .iter()
        .filter_map(RangeToken::from_state)
        .collect::<Vec<_>>();
    let mut resumed = logical;
    if tokens.is_empty() {
        return Ok(resumed);
    }

    let live = provider.feed_ranges(cancellation)?;
    let current = live
        .iter()
        .filter_map(|range| range.epk_range().cloned())
        .collect::<Vec<EpkRange>>();
    let mapping = map_partitions(&current, &tokens)?;

    resumed.extend(
        mapping
            .into_resumable()
            .into_iter()
            .map(|(tile, token)| token.resume_over(tile, &live)),
    );

    Ok(resumed)
}

impl PipelineStage for CrossPartitionStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        self.current = None;
        if !self.enumerator.advance(cancellation) {
            return false;
        }

        let result = match self.enumerator.take_current() {
            Some(Ok(page)) => {
                let state = page
                    .state
                    .map(|state| QueryState::new(state.to_value()));
                let page = QueryPage::new(
                    page.page.documents,
                    page.page.request_charge,
                    page.page.activity_id,
                    state,
                );
                sink::record(PipelineEvent::PageEmitted {
                    stage: StageKind::CrossPartition,
                    documents: page.documents.len() as u64,
                    has_continuation: page.has_continuation(),
                });
                Ok(page)
            }
            Some(Err(err)) => Err(err),
            None => Err(QueryError::internal(
                ErrorOrigin::Enumerator,
                "enumerator advanced without producing a result",
            )),
        };
        self.current = Some(result);

        true
    }

    fn current(&self) -> Option<&StageResult> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<StageResult> {
        self.current.take()
    }
}
