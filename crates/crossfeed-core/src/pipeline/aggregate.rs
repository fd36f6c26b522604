//! Module: pipeline::aggregate
//! Responsibility: fold partial aggregates from the child stream into one
//! final result.
//! Does not own: per-group folding (see `pipeline::group_by`).
//! Boundary: compute pages checkpoint child position and aggregator state.

use crate::{
    aggregate::{AggregateShape, SingleGroupAggregator},
    error::{ErrorOrigin, QueryError},
    obs::sink::{self, PipelineEvent, StageKind},
    pipeline::{
        DoneStage, ExecutionEnvironment, PipelineStage, QueryPage, RequestCharge, StageResult,
        projection::aggregate_payload,
    },
    token::{AggregateContinuationToken, QueryState, SourceToken},
    value::Value,
};
use tokio_util::sync::CancellationToken;

///
/// AggregateStage
///
/// Client: drains the child in a single `advance` and emits one page.
/// Compute: emits one empty checkpoint page per child page, then one final
/// page without a continuation.
///

pub struct AggregateStage {
    environment: ExecutionEnvironment,
    source: Box<dyn PipelineStage>,
    aggregator: SingleGroupAggregator,
    is_value_query: bool,
    current: Option<StageResult>,
    returned_final_page: bool,

    // Client drains accumulate across cancelled attempts.
    request_charge: RequestCharge,
    activity_id: Option<String>,
}

impl AggregateStage {
    /// Build the stage, resuming from `continuation` when present.
    ///
    /// `create_source` receives the child's own continuation. A child that
    /// was already exhausted is replaced by [`DoneStage`].
    #[tracing::instrument(level = "debug", skip_all, fields(environment = ?environment, resumed = continuation.is_some()))]
    pub fn try_create(
        environment: ExecutionEnvironment,
        shape: &AggregateShape,
        continuation: Option<&Value>,
        create_source: impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError>,
    ) -> Result<Self, QueryError> {
        let (aggregator, source) = match (environment, continuation) {
            (ExecutionEnvironment::Client, Some(_)) => {
                return Err(QueryError::unsupported(
                    ErrorOrigin::Aggregate,
                    "continuation tokens are not supported for client-side aggregate queries",
                ));
            }
            (_, None) => (
                SingleGroupAggregator::try_create(shape, None)?,
                create_source(None)?,
            ),
            (ExecutionEnvironment::Compute, Some(continuation)) => {
                let token = AggregateContinuationToken::from_value(continuation)?;
                let aggregator = SingleGroupAggregator::try_create(shape, Some(&token.aggregation))?;
                let source: Box<dyn PipelineStage> = if token.source.is_done() {
                    Box::new(DoneStage)
                } else {
                    create_source(token.source.child_continuation())?
                };
                (aggregator, source)
            }
        };

        sink::record(PipelineEvent::StageCreated {
            stage: StageKind::Aggregate,
            environment,
            resumed: continuation.is_some(),
        });

        Ok(Self {
            environment,
            source,
            aggregator,
            is_value_query: shape.has_select_value,
            current: None,
            returned_final_page: false,
            request_charge: RequestCharge::default(),
            activity_id: None,
        })
    }

    // Fold a whole page or nothing: the aggregator is replaced only after
    // every document folded cleanly.
    fn fold_page(&mut self, documents: Vec<Value>) -> Result<(), QueryError> {
        let mut staged = self.aggregator.clone();
        for document in documents {
            let payload = aggregate_payload(document, self.is_value_query)?;
            staged.add_values(&payload)?;
        }
        self.aggregator = staged;

        Ok(())
    }

    fn emit(&mut self, page: QueryPage) {
        sink::record(PipelineEvent::PageEmitted {
            stage: StageKind::Aggregate,
            documents: page.documents.len() as u64,
            has_continuation: page.has_continuation(),
        });
        self.current = Some(Ok(page));
    }

    fn fail(&mut self, err: QueryError) -> bool {
        self.current = Some(Err(err));
        true
    }

    fn emit_final_page(&mut self) -> bool {
        let documents = self.aggregator.result().into_iter().collect();
        let page = QueryPage::new(
            documents,
            std::mem::take(&mut self.request_charge),
            self.activity_id.take(),
            None,
        );

        tracing::debug!(environment = ?self.environment, "aggregate stage emitting final page");
        self.returned_final_page = true;
        self.emit(page);

        true
    }

    fn advance_client(&mut self, cancellation: &CancellationToken) -> bool {
        loop {
            if cancellation.is_cancelled() {
                return self.fail(QueryError::cancelled(ErrorOrigin::Aggregate));
            }

            let Some(result) = self.source.next_page(cancellation) else {
                break;
            };
            let page = match result {
                Ok(page) => page,
                Err(err) => return self.fail(err),
            };

            self.request_charge += page.request_charge;
            if page.activity_id.is_some() {
                self.activity_id = page.activity_id;
            }
            if let Err(err) = self.fold_page(page.documents) {
                return self.fail(err);
            }
        }

        self.emit_final_page()
    }

    fn advance_compute(&mut self, cancellation: &CancellationToken) -> bool {
        if cancellation.is_cancelled() {
            return self.fail(QueryError::cancelled(ErrorOrigin::Aggregate));
        }

        let page = match self.source.next_page(cancellation) {
            None => return self.emit_final_page(),
            Some(Err(err)) => return self.fail(err),
            Some(Ok(page)) => page,
        };

        let source = SourceToken::after_page(page.state.as_ref());
        if let Err(err) = self.fold_page(page.documents) {
            return self.fail(err);
        }

        let token = AggregateContinuationToken::new(source, self.aggregator.continuation_state());
        self.emit(QueryPage::empty(
            page.request_charge,
            page.activity_id,
            Some(QueryState::new(token.to_value())),
        ));

        true
    }
}

impl PipelineStage for AggregateStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        self.current = None;
        if self.returned_final_page {
            return false;
        }

        match self.environment {
            ExecutionEnvironment::Client => self.advance_client(cancellation),
            ExecutionEnvironment::Compute => self.advance_compute(cancellation),
        }
    }

    fn current(&self) -> Option<&StageResult> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<StageResult> {
        self.current.take()
    }
}
