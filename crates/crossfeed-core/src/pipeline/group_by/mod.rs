//! Module: pipeline::group_by
//! Responsibility: fold rewritten group-by rows into a grouping table and
//! page the finished groups out.
//! Does not own: per-group arithmetic (see `aggregate`).
//! Boundary: compute pages checkpoint the child position and the full
//! table state.

mod table;

pub use table::GroupingTable;

use crate::{
    aggregate::AggregateShape,
    error::{ErrorOrigin, QueryError},
    obs::sink::{self, PipelineEvent, StageKind},
    pipeline::{
        DoneStage, ExecutionEnvironment, PipelineStage, QueryPage, RequestCharge, StageResult,
        projection::group_by_row,
    },
    token::{GroupByContinuationToken, QueryState, SourceToken},
    value::Value,
};
use tokio_util::sync::CancellationToken;

/// Reason attached to every client-environment group-by page.
pub const CLIENT_CONTINUATION_DISALLOWED: &str =
    "continuation tokens are not supported for client-side group by queries";

///
/// GroupByStage
///
/// Phase 1 accumulates child pages into the grouping table. Phase 2 drains
/// up to `page_size` groups per page once the child is exhausted.
///

pub struct GroupByStage {
    environment: ExecutionEnvironment,
    source: Box<dyn PipelineStage>,
    table: GroupingTable,
    page_size: usize,
    current: Option<StageResult>,
    source_exhausted: bool,
    emitted_any: bool,
    done: bool,

    // Client drains accumulate across cancelled attempts.
    request_charge: RequestCharge,
    activity_id: Option<String>,
}

impl GroupByStage {
    /// Build the stage, resuming from `continuation` when present.
    #[tracing::instrument(level = "debug", skip_all, fields(environment = ?environment, resumed = continuation.is_some()))]
    pub fn try_create(
        environment: ExecutionEnvironment,
        shape: &AggregateShape,
        page_size: usize,
        max_groups: Option<usize>,
        continuation: Option<&Value>,
        create_source: impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError>,
    ) -> Result<Self, QueryError> {
        let (table, source, source_exhausted) = match (environment, continuation) {
            (ExecutionEnvironment::Client, Some(_)) => {
                return Err(QueryError::unsupported(
                    ErrorOrigin::GroupBy,
                    CLIENT_CONTINUATION_DISALLOWED,
                ));
            }
            (_, None) => (
                GroupingTable::try_create(shape.clone(), max_groups, None)?,
                create_source(None)?,
                false,
            ),
            (ExecutionEnvironment::Compute, Some(continuation)) => {
                let token = GroupByContinuationToken::from_value(continuation)?;
                let table = GroupingTable::try_create(
                    shape.clone(),
                    max_groups,
                    Some(&token.grouping_table),
                )?;
                if token.source.is_done() {
                    (table, Box::new(DoneStage) as Box<dyn PipelineStage>, true)
                } else {
                    (table, create_source(token.source.child_continuation())?, false)
                }
            }
        };

        sink::record(PipelineEvent::StageCreated {
            stage: StageKind::GroupBy,
            environment,
            resumed: continuation.is_some(),
        });

        Ok(Self {
            environment,
            source,
            table,
            page_size: page_size.max(1),
            current: None,
            source_exhausted,
            emitted_any: false,
            done: false,
            request_charge: RequestCharge::default(),
            activity_id: None,
        })
    }

    fn fold_page(&mut self, documents: Vec<Value>) -> Result<(), QueryError> {
        let rows = documents
            .into_iter()
            .map(group_by_row)
            .collect::<Result<Vec<_>, _>>()?;

        self.table.add_rows(rows)
    }

    fn emit(&mut self, page: QueryPage) -> bool {
        sink::record(PipelineEvent::PageEmitted {
            stage: StageKind::GroupBy,
            documents: page.documents.len() as u64,
            has_continuation: page.has_continuation(),
        });
        self.emitted_any = true;
        self.current = Some(Ok(page));

        true
    }

    fn fail(&mut self, err: QueryError) -> bool {
        self.current = Some(Err(err));
        true
    }

    fn drain_groups(&mut self) -> Vec<Value> {
        let groups = self.page_size.min(self.table.len());
        let documents = self.table.drain(self.page_size);
        sink::record(PipelineEvent::GroupsDrained {
            groups: groups as u64,
            remaining: self.table.len() as u64,
        });

        documents
    }

    fn advance_client(&mut self, cancellation: &CancellationToken) -> bool {
        while !self.source_exhausted {
            if cancellation.is_cancelled() {
                return self.fail(QueryError::cancelled(ErrorOrigin::GroupBy));
            }

            let Some(result) = self.source.next_page(cancellation) else {
                tracing::debug!(groups = self.table.len(), "group by stage entering drain");
                self.source_exhausted = true;
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

        if cancellation.is_cancelled() {
            return self.fail(QueryError::cancelled(ErrorOrigin::GroupBy));
        }

        // No groups at all still yields one page carrying the charges.
        if self.table.is_empty() {
            self.done = true;
            if self.emitted_any {
                return false;
            }
            let page = QueryPage::empty(
                std::mem::take(&mut self.request_charge),
                self.activity_id.take(),
                None,
            )
            .with_disallowed_continuation(CLIENT_CONTINUATION_DISALLOWED);

            return self.emit(page);
        }

        let documents = self.drain_groups();
        self.done = self.table.is_empty();
        let page = QueryPage::new(
            documents,
            std::mem::take(&mut self.request_charge),
            self.activity_id.take(),
            None,
        )
        .with_disallowed_continuation(CLIENT_CONTINUATION_DISALLOWED);

        self.emit(page)
    }

    fn advance_compute(&mut self, cancellation: &CancellationToken) -> bool {
        if cancellation.is_cancelled() {
            return self.fail(QueryError::cancelled(ErrorOrigin::GroupBy));
        }

        if !self.source_exhausted {
            match self.source.next_page(cancellation) {
                None => {
                    tracing::debug!(groups = self.table.len(), "group by stage entering drain");
                    self.source_exhausted = true;
                }
                Some(Err(err)) => return self.fail(err),
                Some(Ok(page)) => {
                    let source = SourceToken::after_page(page.state.as_ref());
                    if let Err(err) = self.fold_page(page.documents) {
                        return self.fail(err);
                    }

                    let token =
                        GroupByContinuationToken::new(source, self.table.continuation_state());
                    return self.emit(QueryPage::empty(
                        page.request_charge,
                        page.activity_id,
                        Some(QueryState::new(token.to_value())),
                    ));
                }
            }
        }

        if self.table.is_empty() {
            self.done = true;
            return false;
        }

        let documents = self.drain_groups();
        let state = if self.table.is_empty() {
            self.done = true;
            None
        } else {
            let token =
                GroupByContinuationToken::new(SourceToken::Done, self.table.continuation_state());
            Some(QueryState::new(token.to_value()))
        };

        self.emit(QueryPage::new(
            documents,
            RequestCharge::default(),
            None,
            state,
        ))
    }
}

impl PipelineStage for GroupByStage {
    fn advance(&mut self, cancellation: &CancellationToken) -> bool {
        self.current = None;
        if self.done {
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
