//! Test doubles for the data-source boundary and for child stages.

pub(crate) mod collection;
pub(crate) mod stage;

pub(crate) use collection::InMemoryCollection;
pub(crate) use stage::ScriptedStage;

use crate::obs::{PipelineEvent, PipelineEventSink};
use std::cell::RefCell;

///
/// CapturingSink
///
/// Event sink that records every event for later assertions.
///

#[derive(Default)]
pub(crate) struct CapturingSink {
    events: RefCell<Vec<PipelineEvent>>,
}

impl CapturingSink {
    pub(crate) fn events(&self) -> Vec<PipelineEvent> {
        self.events.borrow().clone()
    }
}

impl PipelineEventSink for CapturingSink {
    fn record(&self, event: PipelineEvent) {
        self.events.borrow_mut().push(event);
    }
}
