//! Pipeline event sink boundary.
//!
//! This module is the only bridge between execution logic and the
//! thread-local counters. The default sink also emits a `tracing` event
//! for every observation.

use crate::{error::ErrorClass, obs::metrics, pipeline::ExecutionEnvironment};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn PipelineEventSink>>> = RefCell::new(None);
}

///
/// StageKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StageKind {
    Aggregate,
    GroupBy,
    Distinct,
    CrossPartition,
}

///
/// PipelineEvent
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PipelineEvent {
    StageCreated {
        stage: StageKind,
        environment: ExecutionEnvironment,
        resumed: bool,
    },
    PageFetched {
        documents: u64,
        request_charge: f64,
    },
    PageFailed {
        class: ErrorClass,
    },
    PartitionSplit {
        children: u64,
    },
    PartitionMerged,
    RangesResumed {
        ranges: u64,
    },
    PageEmitted {
        stage: StageKind,
        documents: u64,
        has_continuation: bool,
    },
    GroupsDrained {
        groups: u64,
        remaining: u64,
    },
    DuplicatesDropped {
        documents: u64,
    },
}

///
/// PipelineEventSink
///

pub trait PipelineEventSink {
    fn record(&self, event: PipelineEvent);
}

/// CountingSink
/// Default sink: updates the thread-local counters and traces the event.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct CountingSink;

impl PipelineEventSink for CountingSink {
    fn record(&self, event: PipelineEvent) {
        tracing::trace!(?event, "pipeline event");

        metrics::with_state_mut(|m| match event {
            PipelineEvent::StageCreated { resumed, .. } => {
                m.stages_created = m.stages_created.saturating_add(1);
                if resumed {
                    m.stages_resumed = m.stages_resumed.saturating_add(1);
                }
            }
            PipelineEvent::PageFetched {
                documents,
                request_charge,
            } => {
                m.pages_fetched = m.pages_fetched.saturating_add(1);
                m.documents_fetched = m.documents_fetched.saturating_add(documents);
                m.request_charge_total += request_charge;
            }
            PipelineEvent::PageFailed { .. } => {
                m.page_failures = m.page_failures.saturating_add(1);
            }
            PipelineEvent::PartitionSplit { .. } => {
                m.partition_splits = m.partition_splits.saturating_add(1);
            }
            PipelineEvent::PartitionMerged => {
                m.partition_merges = m.partition_merges.saturating_add(1);
            }
            PipelineEvent::RangesResumed { ranges } => {
                m.ranges_resumed = m.ranges_resumed.saturating_add(ranges);
            }
            PipelineEvent::PageEmitted { .. } => {
                m.pages_emitted = m.pages_emitted.saturating_add(1);
            }
            PipelineEvent::GroupsDrained { groups, .. } => {
                m.groups_drained = m.groups_drained.saturating_add(groups);
            }
            PipelineEvent::DuplicatesDropped { documents } => {
                m.duplicates_dropped = m.duplicates_dropped.saturating_add(documents);
            }
        });
    }
}

pub(crate) const COUNTING_SINK: CountingSink = CountingSink;

pub(crate) fn record(event: PipelineEvent) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => COUNTING_SINK.record(event),
    }
}

/// Snapshot the counters of the current thread.
#[must_use]
pub fn metrics_report() -> metrics::PipelineReport {
    metrics::report()
}

/// Reset all counters of the current thread.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary event sink override.
pub fn with_event_sink<T>(sink: Rc<dyn PipelineEventSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn PipelineEventSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
