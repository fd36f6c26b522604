//! Observability: pipeline counters and the sink boundary feeding them.
//!
//! Stage and enumerator code never touches `obs::metrics` directly; every
//! observation is a `PipelineEvent` recorded through `sink::record`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::PipelineReport;
pub use sink::{
    PipelineEvent, PipelineEventSink, StageKind, metrics_report, metrics_reset_all,
    with_event_sink,
};
