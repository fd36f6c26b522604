use serde::{Deserialize, Serialize};
use std::cell::RefCell;

///
/// PipelineCounters
/// Ephemeral, in-memory counters for pipeline activity on this thread.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PipelineCounters {
    // Stage lifecycle
    pub stages_created: u64,
    pub stages_resumed: u64,

    // Data source traffic
    pub pages_fetched: u64,
    pub documents_fetched: u64,
    pub page_failures: u64,
    pub request_charge_total: f64,

    // Topology
    pub partition_splits: u64,
    pub partition_merges: u64,
    pub ranges_resumed: u64,

    // Output
    pub pages_emitted: u64,
    pub groups_drained: u64,
    pub duplicates_dropped: u64,
}

///
/// PipelineReport
/// Point-in-time copy of the counters.
///

pub type PipelineReport = PipelineCounters;

thread_local! {
    static PIPELINE_STATE: RefCell<PipelineCounters> = RefCell::new(PipelineCounters::default());
}

/// Borrow counters immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&PipelineCounters) -> R) -> R {
    PIPELINE_STATE.with(|m| f(&m.borrow()))
}

/// Borrow counters mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut PipelineCounters) -> R) -> R {
    PIPELINE_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = PipelineCounters::default());
}

#[must_use]
pub(crate) fn report() -> PipelineReport {
    with_state(Clone::clone)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.pages_fetched = 3;
            m.request_charge_total = 2.5;
        });

        reset_all();

        assert_eq!(report(), PipelineCounters::default());
    }
}
