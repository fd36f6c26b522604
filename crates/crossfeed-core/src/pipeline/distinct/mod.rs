//! Module: pipeline::distinct
//! Responsibility: drop documents already returned by earlier pages.
//! Does not own: document identity beyond the content hash (see `value`).
//! Boundary: compute pages checkpoint the child position and every hash
//! seen so far.

mod map;

pub use map::DistinctMap;

use crate::{
    error::{ErrorOrigin, QueryError},
    obs::sink::{self, PipelineEvent, StageKind},
    pipeline::{DoneStage, ExecutionEnvironment, PipelineStage, QueryPage, StageResult},
    token::{DistinctContinuationToken, QueryState, SourceToken},
    value::Value,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Reason attached to every client-environment distinct page.
pub const CLIENT_CONTINUATION_DISALLOWED: &str =
    "continuation tokens are not supported for client-side distinct queries";

///
/// DistinctType
///
/// How the planner asks for duplicates to be removed. `Ordered` input
/// arrives sorted by the distinct projection.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

///
/// DistinctStage
///
/// Passes each child page through with the documents already seen removed.
/// Emits one page per child page in both environments.
///

pub struct DistinctStage {
    environment: ExecutionEnvironment,
    source: Box<dyn PipelineStage>,
    map: DistinctMap,
    current: Option<StageResult>,
    done: bool,
}

impl DistinctStage {
    /// Build the stage, resuming from `continuation` when present.
    #[tracing::instrument(level = "debug", skip_all, fields(environment = ?environment, distinct_type = ?distinct_type, resumed = continuation.is_some()))]
    pub fn try_create(
        environment: ExecutionEnvironment,
        distinct_type: DistinctType,
        continuation: Option<&Value>,
        create_source: impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError>,
    ) -> Result<Self, QueryError> {
        let (map, source) = match (environment, continuation) {
            (ExecutionEnvironment::Client, Some(_)) => {
                return Err(QueryError::unsupported(
                    ErrorOrigin::Distinct,
                    CLIENT_CONTINUATION_DISALLOWED,
                ));
            }
            (_, None) => (
                DistinctMap::try_create(distinct_type, None)?,
                create_source(None)?,
            ),
            (ExecutionEnvironment::Compute, Some(continuation)) => {
                let token = DistinctContinuationToken::from_value(continuation)?;
                let map = DistinctMap::try_create(distinct_type, Some(&token.distinct_map))?;
                if token.source.is_done() {
                    (map, Box::new(DoneStage) as Box<dyn PipelineStage>)
                } else {
                    (map, create_source(token.source.child_continuation())?)
                }
            }
        };

        sink::record(PipelineEvent::StageCreated {
            stage: StageKind::Distinct,
            environment,
            resumed: continuation.is_some(),
        });

        Ok(Self {
            environment,
            source,
            map,
            current: None,
            done: false,
        })
    }

    fn filter(&mut self, documents: Vec<Value>) -> Vec<Value> {
        let received = documents.len();
        let kept = documents
            .into_iter()
            .filter(|document| self.map.add(document))
            .collect::<Vec<_>>();

        let dropped = received - kept.len();
        if dropped > 0 {
            sink::record(PipelineEvent::DuplicatesDropped {
                documents: dropped as u64,
            });
        }

        kept
    }

    fn emit(&mut self, page: QueryPage) -> bool {
        sink::record(PipelineEvent::PageEmitted {
            stage: StageKind::Distinct,
            documents: page.documents.len() as u64,
            has_continuation: page.has_continuation(),
        });
        self.current = Some(Ok(page));

        true
    }

    fn fail(&mut self, err: QueryError) -> bool {
        self.current = Some(Err(err));
        true
    }
}

impl PipelineStage for DistinctStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        self.current = None;
        if self.done {
            return false;
        }
        if cancellation.is_cancelled() {
            return self.fail(QueryError::cancelled(ErrorOrigin::Distinct));
        }

        let page = match self.source.next_page(cancellation) {
            None => {
                self.done = true;
                return false;
            }
            Some(Err(err)) => return self.fail(err),
            Some(Ok(page)) => page,
        };

        let source = SourceToken::after_page(page.state.as_ref());
        let documents = self.filter(page.documents);

        let page = match self.environment {
            ExecutionEnvironment::Client => {
                QueryPage::new(documents, page.request_charge, page.activity_id, None)
                    .with_disallowed_continuation(CLIENT_CONTINUATION_DISALLOWED)
            }
            ExecutionEnvironment::Compute => {
                // The last child page ends the query; nothing to resume.
                let state = (!source.is_done()).then(|| {
                    let token =
                        DistinctContinuationToken::new(source, self.map.continuation_state());
                    QueryState::new(token.to_value())
                });
                QueryPage::new(documents, page.request_charge, page.activity_id, state)
            }
        };

        self.emit(page)
    }

    fn current(&self) -> Option<&StageResult> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<StageResult> {
        self.current.take()
    }
}
