use crate::{
    error::QueryError,
    range::FeedRange,
    source::{DataSourcePage, PageRequest, QueryDataSource},
    token::{FeedRangeState, QueryState},
};
use tokio_util::sync::CancellationToken;

///
/// PartitionRangePageEnumerator
///
/// Pages through a single feed range. The stored state only moves forward
/// after a successful fetch, so a failed fetch can be retried as-is.
///

#[derive(Clone, Debug)]
pub struct PartitionRangePageEnumerator {
    feed_range: FeedRange,
    state: Option<QueryState>,
    has_started: bool,
    page_size_hint: u32,
}

impl PartitionRangePageEnumerator {
    #[must_use]
    pub const fn new(feed_range: FeedRange, state: Option<QueryState>, page_size_hint: u32) -> Self {
        Self {
            feed_range,
            state,
            has_started: false,
            page_size_hint,
        }
    }

    #[must_use]
    pub const fn feed_range(&self) -> &FeedRange {
        &self.feed_range
    }

    #[must_use]
    pub const fn state(&self) -> Option<&QueryState> {
        self.state.as_ref()
    }

    /// True once a fetched page reported no continuation.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.has_started && self.state.is_none()
    }

    /// Fetch the next page, `None` when the range is exhausted.
    pub fn fetch_next(
        &mut self,
        data_source: &dyn QueryDataSource,
        cancellation: &CancellationToken,
    ) -> Option<Result<DataSourcePage, QueryError>> {
        if self.is_exhausted() {
            return None;
        }

        let request = PageRequest {
            range: &self.feed_range,
            continuation: self.state.as_ref(),
            page_size_hint: self.page_size_hint,
        };
        let page = match data_source.fetch_page(&request, cancellation) {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };

        self.has_started = true;
        self.state.clone_from(&page.continuation);

        Some(Ok(page))
    }

    /// Resume point of this range as it would appear in a continuation.
    #[must_use]
    pub fn pending_state(&self) -> FeedRangeState {
        FeedRangeState::new(self.feed_range.clone(), self.state.clone())
    }
}
