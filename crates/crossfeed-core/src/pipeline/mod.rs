//! Module: pipeline
//! Responsibility: the pull-based stage contract and the stages built on
//! it (aggregate, distinct, group-by, cross-partition source).
//! Does not own: page fetching or topology discovery (see `source`).
//! Boundary: every stage checkpoints its full state in each emitted page.

pub mod aggregate;
pub mod cross_partition;
pub mod distinct;
pub mod factory;
pub mod group_by;
mod page;
pub(crate) mod projection;

#[cfg(test)]
mod tests;

pub use aggregate::AggregateStage;
pub use cross_partition::CrossPartitionStage;
pub use distinct::{DistinctStage, DistinctType};
pub use factory::{QueryInfo, build_pipeline, create_query_pipeline};
pub use group_by::GroupByStage;
pub use page::{QueryPage, RequestCharge};

use crate::error::{ErrorOrigin, QueryError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Outcome of one stage step.
pub type StageResult = Result<QueryPage, QueryError>;

///
/// ExecutionEnvironment
///
/// Where the pipeline runs. `Client` drains everything before returning and
/// never hands out a continuation; `Compute` returns after every child page
/// with a resumable continuation.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    Client,
    #[default]
    Compute,
}

///
/// PipelineStage
///
/// Pull contract shared by every stage. `advance` returns `true` when a new
/// result is available in `current` (a page or a failure) and `false` once
/// the stage is exhausted.
///

pub trait PipelineStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool;

    fn current(&self) -> Option<&StageResult>;

    fn take_current(&mut self) -> Option<StageResult>;

    /// Advance and take the new result in one step; `None` once exhausted.
    fn next_page(&mut self, cancellation: &CancellationToken) -> Option<StageResult> {
        if !self.advance(cancellation) {
            return None;
        }

        Some(self.take_current().unwrap_or_else(|| {
            Err(QueryError::internal(
                ErrorOrigin::Pipeline,
                "stage advanced without producing a result",
            ))
        }))
    }
}

impl<S: PipelineStage + ?Sized> PipelineStage for Box<S> {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        (**self).advance(cancellation)
    }

    fn current(&self) -> Option<&StageResult> {
        (**self).current()
    }

    fn take_current(&mut self) -> Option<StageResult> {
        (**self).take_current()
    }
}

///
/// DoneStage
///
/// Always-exhausted stand-in for a child that finished before the
/// continuation was produced.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct DoneStage;

impl PipelineStage for DoneStage {
    fn advance(&mut self, _cancellation: &CancellationToken) -> bool {
        false
    }

    fn current(&self) -> Option<&StageResult> {
        None
    }

    fn take_current(&mut self) -> Option<StageResult> {
        None
    }
}

///
/// QueryStage
///
/// Root of a built pipeline.
///

pub enum QueryStage {
    Aggregate(AggregateStage),
    Distinct(DistinctStage),
    GroupBy(GroupByStage),
    Source(Box<dyn PipelineStage>),
}

impl PipelineStage for QueryStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        match self {
            Self::Aggregate(stage) => stage.advance(cancellation),
            Self::Distinct(stage) => stage.advance(cancellation),
            Self::GroupBy(stage) => stage.advance(cancellation),
            Self::Source(stage) => stage.advance(cancellation),
        }
    }

    fn current(&self) -> Option<&StageResult> {
        match self {
            Self::Aggregate(stage) => stage.current(),
            Self::Distinct(stage) => stage.current(),
            Self::GroupBy(stage) => stage.current(),
            Self::Source(stage) => stage.current(),
        }
    }

    fn take_current(&mut self) -> Option<StageResult> {
        match self {
            Self::Aggregate(stage) => stage.take_current(),
            Self::Distinct(stage) => stage.take_current(),
            Self::GroupBy(stage) => stage.take_current(),
            Self::Source(stage) => stage.take_current(),
        }
    }
}

impl std::fmt::Debug for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Aggregate(_) => "Aggregate",
            Self::Distinct(_) => "Distinct",
            Self::GroupBy(_) => "GroupBy",
            Self::Source(_) => "Source",
        };
        f.debug_tuple("QueryStage").field(&label).finish()
    }
}
