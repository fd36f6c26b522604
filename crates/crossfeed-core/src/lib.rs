//! Resumable cross-partition query execution: partition mapping, the range
//! page enumerator, and the aggregate and group-by stages layered on it.

// public exports are one module level down
pub mod aggregate;
pub mod config;
pub mod direction;
pub mod enumerator;
pub mod error;
pub mod obs;
pub mod pipeline;
pub mod range;
pub mod source;
pub mod token;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Types needed to build a pipeline and pull pages from it.
///

pub mod prelude {
    pub use crate::{
        config::PipelineConfig,
        direction::Direction,
        error::QueryError,
        pipeline::{
            ExecutionEnvironment, PipelineStage, QueryInfo, QueryPage, create_query_pipeline,
        },
        range::{EpkRange, FeedRange},
        source::{DataSourcePage, FeedRangeProvider, PageRequest, QueryDataSource},
        token::{decode_continuation, encode_continuation},
        value::Value,
    };
    pub use tokio_util::sync::CancellationToken;
}
