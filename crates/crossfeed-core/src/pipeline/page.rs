use crate::{token::QueryState, value::Value};
use derive_more::{Add, AddAssign, Deref, Display, Sum};

///
/// RequestCharge
///
/// Cost units reported by the data source for one or more pages.
///

#[derive(Add, AddAssign, Clone, Copy, Debug, Default, Deref, Display, PartialEq, PartialOrd, Sum)]
pub struct RequestCharge(f64);

impl RequestCharge {
    #[must_use]
    pub const fn new(units: f64) -> Self {
        Self(units)
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

///
/// QueryPage
///
/// One page produced by a pipeline stage. `state` is the continuation to
/// resume after this page; `None` means the stage has nothing further.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    pub documents: Vec<Value>,
    pub request_charge: RequestCharge,
    pub activity_id: Option<String>,
    pub state: Option<QueryState>,

    /// Set when the caller must not persist a continuation for this query.
    pub disallow_continuation_reason: Option<String>,
}

impl QueryPage {
    #[must_use]
    pub const fn new(
        documents: Vec<Value>,
        request_charge: RequestCharge,
        activity_id: Option<String>,
        state: Option<QueryState>,
    ) -> Self {
        Self {
            documents,
            request_charge,
            activity_id,
            state,
            disallow_continuation_reason: None,
        }
    }

    /// Page with no documents; used while a stage is still accumulating.
    #[must_use]
    pub const fn empty(
        request_charge: RequestCharge,
        activity_id: Option<String>,
        state: Option<QueryState>,
    ) -> Self {
        Self::new(Vec::new(), request_charge, activity_id, state)
    }

    #[must_use]
    pub fn with_disallowed_continuation(mut self, reason: impl Into<String>) -> Self {
        self.disallow_continuation_reason = Some(reason.into());
        self
    }

    #[must_use]
    pub const fn has_continuation(&self) -> bool {
        self.state.is_some()
    }
}
