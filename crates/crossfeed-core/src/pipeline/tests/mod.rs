mod aggregate;
mod factory;

use crate::{
    error::QueryError,
    pipeline::{PipelineStage, QueryPage},
    token::{decode_continuation, encode_continuation},
    value::Value,
};
use tokio_util::sync::CancellationToken;

/// Pull pages until the stage is exhausted, stopping at the first failure.
fn drain_pages(stage: &mut impl PipelineStage) -> Result<Vec<QueryPage>, QueryError> {
    let cancellation = CancellationToken::new();
    let mut pages = Vec::new();
    while let Some(result) = stage.next_page(&cancellation) {
        pages.push(result?);
    }

    Ok(pages)
}

fn next_page(stage: &mut impl PipelineStage) -> QueryPage {
    stage
        .next_page(&CancellationToken::new())
        .expect("stage should not be exhausted")
        .expect("page should succeed")
}

/// Send a page's continuation through the string codec, as a caller would.
fn round_trip(page: &QueryPage) -> Value {
    let state = page.state.as_ref().expect("page should carry a continuation");
    decode_continuation(&encode_continuation(state)).expect("continuation should decode")
}

fn documents(pages: &[QueryPage]) -> Vec<Value> {
    pages
        .iter()
        .flat_map(|page| page.documents.iter().cloned())
        .collect()
}

fn sorted(mut documents: Vec<Value>) -> Vec<Value> {
    documents.sort_by_key(ToString::to_string);
    documents
}
