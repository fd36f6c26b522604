//! Module: pipeline::factory
//! Responsibility: assemble the stage tree for one query from its
//! rewritten query info.
//! Does not own: stage semantics.
//! Boundary: the caller's continuation belongs to the root stage.

use crate::{
    aggregate::{AggregateOperator, AggregateShape},
    config::PipelineConfig,
    error::QueryError,
    pipeline::{
        AggregateStage, CrossPartitionStage, DistinctStage, DistinctType, GroupByStage,
        PipelineStage, QueryStage,
    },
    source::{FeedRangeProvider, QueryDataSource},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio_util::sync::CancellationToken;

///
/// QueryInfo
///
/// Query facts reported by the query planner for the rewritten query.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryInfo {
    pub aggregates: Vec<AggregateOperator>,
    pub group_by_expressions: Vec<String>,
    pub group_by_alias_to_aggregate_type: BTreeMap<String, Option<AggregateOperator>>,
    pub group_by_aliases: Vec<String>,
    pub has_select_value: bool,
    pub distinct_type: DistinctType,
}

impl QueryInfo {
    #[must_use]
    pub const fn has_group_by(&self) -> bool {
        !self.group_by_expressions.is_empty()
    }

    #[must_use]
    pub const fn has_distinct(&self) -> bool {
        !matches!(self.distinct_type, DistinctType::None)
    }

    #[must_use]
    pub fn has_aggregates(&self) -> bool {
        !self.aggregates.is_empty() || !self.group_by_alias_to_aggregate_type.is_empty()
    }

    #[must_use]
    pub fn aggregate_shape(&self) -> AggregateShape {
        AggregateShape {
            aggregates: self.aggregates.clone(),
            alias_to_aggregate: self.group_by_alias_to_aggregate_type.clone(),
            ordered_aliases: self.group_by_aliases.clone(),
            has_select_value: self.has_select_value,
        }
    }
}

/// Build the stage tree over the leaf stage produced by `create_source`.
///
/// Stages nest source, then aggregate (without group by), then distinct,
/// then group by. `create_source` receives the continuation of the leaf
/// stage, which is nested inside the tokens of every stage above it.
pub fn build_pipeline(
    info: &QueryInfo,
    config: &PipelineConfig,
    continuation: Option<&Value>,
    create_source: impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError>,
) -> Result<QueryStage, QueryError> {
    config.validate()?;

    if info.has_group_by() {
        let stage = GroupByStage::try_create(
            config.environment,
            &info.aggregate_shape(),
            config.page_size_usize(),
            config.max_groups_usize(),
            continuation,
            |inner| build_distinct(info, config, inner, create_source).map(boxed),
        )?;
        return Ok(QueryStage::GroupBy(stage));
    }

    build_distinct(info, config, continuation, create_source)
}

fn build_distinct(
    info: &QueryInfo,
    config: &PipelineConfig,
    continuation: Option<&Value>,
    create_source: impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError>,
) -> Result<QueryStage, QueryError> {
    if !info.has_distinct() {
        return build_aggregate(info, config, continuation, create_source);
    }

    let stage = DistinctStage::try_create(
        config.environment,
        info.distinct_type,
        continuation,
        |inner| build_aggregate(info, config, inner, create_source).map(boxed),
    )?;

    Ok(QueryStage::Distinct(stage))
}

fn build_aggregate(
    info: &QueryInfo,
    config: &PipelineConfig,
    continuation: Option<&Value>,
    create_source: impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError>,
) -> Result<QueryStage, QueryError> {
    // Group by folds its own aggregates.
    if !info.has_aggregates() || info.has_group_by() {
        return Ok(QueryStage::Source(create_source(continuation)?));
    }

    let stage = AggregateStage::try_create(
        config.environment,
        &info.aggregate_shape(),
        continuation,
        create_source,
    )?;

    Ok(QueryStage::Aggregate(stage))
}

fn boxed(stage: QueryStage) -> Box<dyn PipelineStage> {
    match stage {
        QueryStage::Source(source) => source,
        other => Box::new(other),
    }
}

/// Build the stage tree over a cross-partition read of the collection.
pub fn create_query_pipeline(
    info: &QueryInfo,
    config: &PipelineConfig,
    continuation: Option<&Value>,
    data_source: Arc<dyn QueryDataSource>,
    provider: Arc<dyn FeedRangeProvider>,
    cancellation: &CancellationToken,
) -> Result<QueryStage, QueryError> {
    let direction = config.direction;
    let page_size = config.page_size;

    build_pipeline(info, config, continuation, |source_continuation| {
        let stage = CrossPartitionStage::try_create(
            data_source,
            provider,
            direction,
            page_size,
            source_continuation,
            cancellation,
        )?;

        Ok(Box::new(stage) as Box<dyn PipelineStage>)
    })
}
