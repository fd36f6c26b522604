//! Module: source
//! Responsibility: the boundary to the storage service (page fetches and
//! feed range discovery).
//! Does not own: retries, transport, or authentication.
//! Boundary: a split or moved range surfaces as
//! `UpstreamFailure::PartitionGone` in the returned error.

use crate::{
    error::QueryError,
    pipeline::RequestCharge,
    range::{EpkRange, FeedRange},
    token::QueryState,
    value::Value,
};
use tokio_util::sync::CancellationToken;

///
/// PageRequest
///
/// One page fetch against one feed range.
///

#[derive(Clone, Copy, Debug)]
pub struct PageRequest<'a> {
    pub range: &'a FeedRange,
    pub continuation: Option<&'a QueryState>,
    pub page_size_hint: u32,
}

///
/// DataSourcePage
///
/// `continuation` is `None` once the range is exhausted.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSourcePage {
    pub documents: Vec<Value>,
    pub request_charge: RequestCharge,
    pub activity_id: Option<String>,
    pub continuation: Option<QueryState>,
}

///
/// QueryDataSource
///

pub trait QueryDataSource {
    fn fetch_page(
        &self,
        request: &PageRequest<'_>,
        cancellation: &CancellationToken,
    ) -> Result<DataSourcePage, QueryError>;
}

///
/// FeedRangeProvider
///
/// Current partition topology.
///

pub trait FeedRangeProvider {
    /// Every feed range the collection is currently served by.
    fn feed_ranges(&self, cancellation: &CancellationToken) -> Result<Vec<FeedRange>, QueryError>;

    /// Key intervals now serving `range`, used after a split.
    fn child_ranges(
        &self,
        range: &FeedRange,
        cancellation: &CancellationToken,
    ) -> Result<Vec<EpkRange>, QueryError>;
}
