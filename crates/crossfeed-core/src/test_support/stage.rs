use crate::{
    error::{ErrorOrigin, QueryError, UpstreamFailure},
    pipeline::{PipelineStage, QueryPage, RequestCharge, StageResult},
    token::QueryState,
    value::Value,
};
use serde_json::json;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

///
/// ScriptedStage
///
/// Child stage replaying fixed pages. The continuation after page `i` is
/// the number `i + 1`; the last page carries none. Failures fire once, in
/// place of the page at their index.
///

pub(crate) struct ScriptedStage {
    pages: Vec<Vec<Value>>,
    position: usize,
    failures: BTreeMap<usize, UpstreamFailure>,
    current: Option<StageResult>,
}

impl ScriptedStage {
    pub(crate) fn new(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            position: 0,
            failures: BTreeMap::new(),
            current: None,
        }
    }

    /// Start at the page a previous continuation points to.
    pub(crate) fn resume(
        pages: Vec<Vec<Value>>,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        let mut stage = Self::new(pages);
        if let Some(continuation) = continuation {
            let position = continuation
                .as_u64()
                .and_then(|position| usize::try_from(position).ok())
                .ok_or_else(|| {
                    QueryError::malformed_token(format!("bad scripted continuation {continuation}"))
                })?;
            stage.position = position;
        }

        Ok(stage)
    }

    pub(crate) fn fail_once_at(mut self, index: usize, failure: UpstreamFailure) -> Self {
        self.failures.insert(index, failure);
        self
    }
}

impl PipelineStage for ScriptedStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        self.current = None;
        if cancellation.is_cancelled() {
            self.current = Some(Err(QueryError::cancelled(ErrorOrigin::DataSource)));
            return true;
        }
        if self.position >= self.pages.len() {
            return false;
        }
        if let Some(failure) = self.failures.remove(&self.position) {
            self.current = Some(Err(QueryError::upstream(failure)));
            return true;
        }

        let documents = self.pages[self.position].clone();
        self.position += 1;
        let state =
            (self.position < self.pages.len()).then(|| QueryState::new(json!(self.position)));
        self.current = Some(Ok(QueryPage::new(
            documents,
            RequestCharge::new(1.0),
            Some(format!("scripted-{}", self.position)),
            state,
        )));

        true
    }

    fn current(&self) -> Option<&StageResult> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<StageResult> {
        self.current.take()
    }
}
