use crate::{
    error::{QueryError, UpstreamFailure},
    pipeline::RequestCharge,
    range::{EpkRange, FeedRange, PartitionKeyRange},
    source::{DataSourcePage, FeedRangeProvider, PageRequest, QueryDataSource},
    token::QueryState,
    value::Value,
};
use serde_json::json;
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};
use tokio_util::sync::CancellationToken;

///
/// InMemoryCollection
///
/// Partitioned document store. Every document lives at an EPK key; each
/// partition serves one key interval. Continuations record the last key
/// returned, so they stay valid after a split.
///

pub(crate) struct InMemoryCollection {
    inner: Mutex<CollectionState>,
}

struct CollectionState {
    partitions: Vec<Partition>,
    documents: Vec<(String, Value)>,
    faults: VecDeque<UpstreamFailure>,
    next_partition_id: u32,
    fetches: usize,
}

#[derive(Clone)]
struct Partition {
    id: u32,
    range: EpkRange,
}

impl InMemoryCollection {
    /// One partition per interval between consecutive `boundaries`.
    pub(crate) fn new(boundaries: &[&str]) -> Self {
        let mut edges = vec![crate::range::MIN_EPK.to_string()];
        edges.extend(boundaries.iter().map(ToString::to_string));
        edges.push(crate::range::MAX_EPK.to_string());

        let partitions = edges
            .windows(2)
            .zip(0..)
            .map(|(pair, id)| Partition {
                id,
                range: EpkRange::new(pair[0].clone(), pair[1].clone()),
            })
            .collect::<Vec<_>>();
        let next_partition_id = u32::try_from(partitions.len()).expect("partition count fits");

        Self {
            inner: Mutex::new(CollectionState {
                partitions,
                documents: Vec::new(),
                faults: VecDeque::new(),
                next_partition_id,
                fetches: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CollectionState> {
        self.inner.lock().expect("collection lock")
    }

    /// Store `document` at `epk`; a sequence suffix keeps keys unique.
    pub(crate) fn insert(&self, epk: &str, document: Value) {
        let mut state = self.state();
        let key = format!("{epk}-{:06}", state.documents.len());
        state.documents.push((key, document));
        state.documents.sort_by(|left, right| left.0.cmp(&right.0));
    }

    /// Split the live partition containing `at` into two at that key.
    pub(crate) fn split_at(&self, at: &str) {
        let mut state = self.state();
        let index = state
            .partitions
            .iter()
            .position(|partition| partition.range.contains_key(at) && partition.range.min != at)
            .expect("split key inside a live partition");
        let parent = state.partitions.remove(index);

        let left_id = state.next_partition_id;
        state.next_partition_id += 2;
        state.partitions.insert(
            index,
            Partition {
                id: left_id + 1,
                range: EpkRange::new(at, parent.range.max.clone()),
            },
        );
        state.partitions.insert(
            index,
            Partition {
                id: left_id,
                range: EpkRange::new(parent.range.min, at),
            },
        );
    }

    /// Merge the two live partitions meeting at `at` into one with a new id.
    pub(crate) fn merge_at(&self, at: &str) {
        let mut state = self.state();
        let index = state
            .partitions
            .iter()
            .position(|partition| partition.range.max == at)
            .expect("a live partition ends at the merge key");
        assert_eq!(
            state.partitions[index + 1].range.min, at,
            "a live partition starts at the merge key"
        );

        let right = state.partitions.remove(index + 1);
        let left = state.partitions.remove(index);
        let id = state.next_partition_id;
        state.next_partition_id += 1;
        state.partitions.insert(
            index,
            Partition {
                id,
                range: EpkRange::new(left.range.min, right.range.max),
            },
        );
    }

    /// Fail the next fetch with `failure`.
    pub(crate) fn fail_next(&self, failure: UpstreamFailure) {
        self.state().faults.push_back(failure);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    pub(crate) fn partition_count(&self) -> usize {
        self.state().partitions.len()
    }
}

impl CollectionState {
    // Interval a request reads, or gone when no live partition serves it
    // whole.
    fn resolve(&self, range: &FeedRange) -> Result<EpkRange, QueryError> {
        match range {
            FeedRange::Epk(range) => self
                .partitions
                .iter()
                .find(|partition| {
                    partition.range.min <= range.min && range.max <= partition.range.max
                })
                .map(|_| range.clone())
                .ok_or_else(|| QueryError::partition_gone(range.clone())),
            FeedRange::PartitionKeyRange(pk_range) => self
                .partitions
                .iter()
                .find(|partition| partition.id.to_string() == pk_range.id)
                .map(|partition| partition.range.clone())
                .ok_or_else(|| QueryError::partition_gone(pk_range.range.clone())),
            FeedRange::LogicalPartitionKey(key) => {
                let key = key.as_str().unwrap_or_default();
                Ok(EpkRange::new(key, format!("{key}.")))
            }
        }
    }
}

impl QueryDataSource for InMemoryCollection {
    fn fetch_page(
        &self,
        request: &PageRequest<'_>,
        cancellation: &CancellationToken,
    ) -> Result<DataSourcePage, QueryError> {
        let mut state = self.state();
        state.fetches += 1;

        if cancellation.is_cancelled() {
            return Err(QueryError::cancelled(crate::error::ErrorOrigin::DataSource));
        }
        if let Some(failure) = state.faults.pop_front() {
            return Err(QueryError::upstream(failure));
        }

        let range = state.resolve(request.range)?;
        let after = request
            .continuation
            .and_then(|continuation| continuation.get("after"))
            .and_then(Value::as_str);
        let page_size = usize::try_from(request.page_size_hint.max(1)).unwrap_or(usize::MAX);

        let mut matching = state
            .documents
            .iter()
            .filter(|(key, _)| range.contains_key(key))
            .filter(|(key, _)| after.is_none_or(|after| key.as_str() > after));
        let page = matching.by_ref().take(page_size).cloned().collect::<Vec<_>>();
        let has_more = matching.next().is_some();

        let continuation = match page.last() {
            Some((key, _)) if has_more => Some(QueryState::new(json!({ "after": key }))),
            _ => None,
        };
        let activity_id = format!("activity-{}", state.fetches);

        Ok(DataSourcePage {
            documents: page.into_iter().map(|(_, document)| document).collect(),
            request_charge: RequestCharge::new(1.0),
            activity_id: Some(activity_id),
            continuation,
        })
    }
}

impl FeedRangeProvider for InMemoryCollection {
    fn feed_ranges(&self, _cancellation: &CancellationToken) -> Result<Vec<FeedRange>, QueryError> {
        Ok(self
            .state()
            .partitions
            .iter()
            .map(|partition| {
                FeedRange::PartitionKeyRange(PartitionKeyRange::new(
                    partition.id.to_string(),
                    partition.range.clone(),
                ))
            })
            .collect())
    }

    fn child_ranges(
        &self,
        range: &FeedRange,
        _cancellation: &CancellationToken,
    ) -> Result<Vec<EpkRange>, QueryError> {
        let Some(range) = range.epk_range() else {
            return Ok(Vec::new());
        };

        Ok(self
            .state()
            .partitions
            .iter()
            .filter(|partition| partition.range.overlaps(range))
            .map(|partition| partition.range.clone())
            .collect())
    }
}
