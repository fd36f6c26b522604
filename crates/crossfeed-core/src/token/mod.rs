//! Module: token
//! Responsibility: continuation-token data model and its JSON wire form.
//! Does not own: interpretation of child stage state, which stays opaque.
//! Boundary: every decode failure is a malformed-continuation `QueryError`.

mod aggregate;
mod codec;
mod distinct;
mod feed_range;
mod group_by;


pub use aggregate::AggregateContinuationToken;
pub use codec::{MAX_CONTINUATION_TOKEN_BYTES, TokenDecodeError, decode_continuation, encode_continuation};
pub use distinct::DistinctContinuationToken;
pub use feed_range::{CrossFeedRangeState, FeedRangeState, RangeToken};
pub use group_by::GroupByContinuationToken;

use crate::value::Value;
use derive_more::Deref;

/// Sentinel recorded in place of a child continuation once the child is
/// exhausted.
pub const DONE_SOURCE_TOKEN: &str = "DONE";

///
/// QueryState
///
/// Opaque continuation produced by a stage or data source. Only the stage
/// that produced it interprets its contents.
///

#[derive(Clone, Debug, Deref, Eq, PartialEq)]
pub struct QueryState(Value);

impl QueryState {
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }
}

impl From<Value> for QueryState {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

///
/// SourceToken
///
/// Child-stage position recorded inside a stage continuation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceToken {
    /// The child has not produced a continuation yet.
    Initial,
    /// Resume the child from its own continuation.
    Continuation(QueryState),
    /// The child is exhausted.
    Done,
}

impl SourceToken {
    /// Source token to record after a child page with the given state.
    #[must_use]
    pub fn after_page(state: Option<&QueryState>) -> Self {
        state.map_or(Self::Done, |state| Self::Continuation(state.clone()))
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Continuation to hand to a freshly created child, `None` when the
    /// child starts from scratch or is already exhausted.
    #[must_use]
    pub fn child_continuation(&self) -> Option<&Value> {
        match self {
            Self::Continuation(state) => Some(state),
            Self::Initial | Self::Done => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Initial => Value::Null,
            Self::Continuation(state) => (**state).clone(),
            Self::Done => Value::String(DONE_SOURCE_TOKEN.to_string()),
        }
    }

    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Initial,
            Value::String(s) if s == DONE_SOURCE_TOKEN => Self::Done,
            other => Self::Continuation(QueryState::new(other.clone())),
        }
    }
}
