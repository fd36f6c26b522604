use crate::range::EpkRange;
use std::fmt;
use thiserror::Error as ThisError;

///
/// QueryError
///
/// Structured pipeline error with a stable classification.
/// Child failures are passed through unwrapped so callers always see the
/// class and origin assigned where the failure happened.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct QueryError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl QueryError {
    /// Construct a QueryError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a malformed-continuation error for a specific origin.
    pub(crate) fn malformed(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::MalformedContinuationToken, origin, message)
    }

    /// Construct a token-origin malformed-continuation error.
    pub(crate) fn malformed_token(message: impl Into<String>) -> Self {
        Self::malformed(ErrorOrigin::Token, message)
    }

    /// Construct a projection-origin malformed-document error.
    pub(crate) fn malformed_projection(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Projection,
            message,
        )
    }

    /// Construct an invariant violation for a specific origin.
    pub(crate) fn invariant(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, origin, message)
    }

    /// Construct an unsupported-operation error for a specific origin.
    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    /// Construct an internal error for a specific origin.
    pub(crate) fn internal(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, origin, message)
    }

    /// Construct the error surfaced when a cancellation token fires.
    #[must_use]
    pub fn cancelled(origin: ErrorOrigin) -> Self {
        Self::new(
            ErrorClass::Cancelled,
            origin,
            format!("operation cancelled ({origin})"),
        )
    }

    /// Construct a mapper failure carrying its structured detail.
    #[must_use]
    pub fn mapper(err: MapperError) -> Self {
        Self {
            class: ErrorClass::MalformedContinuationToken,
            origin: ErrorOrigin::Mapper,
            message: err.to_string(),
            detail: Some(ErrorDetail::Mapper(err)),
        }
    }

    /// Construct a data-source page failure carrying its structured detail.
    #[must_use]
    pub fn upstream(failure: UpstreamFailure) -> Self {
        Self {
            class: ErrorClass::UpstreamPageFailure,
            origin: ErrorOrigin::DataSource,
            message: failure.to_string(),
            detail: Some(ErrorDetail::Upstream(failure)),
        }
    }

    /// Construct the error a data source reports when a feed range split
    /// or moved and the range must be re-resolved.
    #[must_use]
    pub fn partition_gone(range: EpkRange) -> Self {
        Self::upstream(UpstreamFailure::PartitionGone { range })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.class, ErrorClass::Cancelled)
    }

    #[must_use]
    pub const fn is_malformed_continuation(&self) -> bool {
        matches!(self.class, ErrorClass::MalformedContinuationToken)
    }

    /// True when the data source reported that the range split or moved.
    #[must_use]
    pub const fn is_partition_gone(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Upstream(UpstreamFailure::PartitionGone { .. }))
        )
    }

    /// True when a prior token overlapped several live ranges, which can
    /// only happen if the reported topology is inconsistent.
    #[must_use]
    pub const fn is_topology_inconsistency(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Mapper(
                MapperError::TokenSpansMultipleRanges { .. } | MapperError::ChildRangesDoNotCover { .. }
            ))
        )
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`QueryError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Mapper(MapperError),

    #[error("{0}")]
    Upstream(UpstreamFailure),
}

///
/// MapperError
///
/// Failures raised while reconciling prior continuation tokens with the
/// current set of feed ranges.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MapperError {
    #[error("continuation token list is empty")]
    NoContinuationTokens,

    #[error("continuation token range {token} overlaps {overlapping} current ranges")]
    TokenSpansMultipleRanges { token: EpkRange, overlapping: usize },

    #[error("continuation token range {token} overlaps a range already claimed by another token")]
    OverlappingTokens { token: EpkRange },

    #[error("target range {target} not found among {candidates} mapped ranges")]
    TargetRangeNotFound { target: EpkRange, candidates: usize },

    #[error("child ranges do not tile parent range {parent}")]
    ChildRangesDoNotCover { parent: EpkRange },
}

///
/// UpstreamFailure
///
/// Page-fetch failure reported by a data source.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum UpstreamFailure {
    #[error("feed range {range} is gone (split or merged)")]
    PartitionGone { range: EpkRange },

    #[error("request throttled")]
    Throttled { retry_after_ms: Option<u64> },

    #[error("transient upstream failure (status {status})")]
    Transient { status: u16 },

    #[error("upstream failure: {message}")]
    Other { message: String },
}

///
/// ErrorClass
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    MalformedContinuationToken,
    UpstreamPageFailure,
    InvariantViolation,
    Cancelled,
    Unsupported,
    LimitExceeded,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MalformedContinuationToken => "malformed_continuation_token",
            Self::UpstreamPageFailure => "upstream_page_failure",
            Self::InvariantViolation => "invariant_violation",
            Self::Cancelled => "cancelled",
            Self::Unsupported => "unsupported",
            Self::LimitExceeded => "limit_exceeded",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Mapper,
    Token,
    Aggregate,
    GroupBy,
    Distinct,
    Enumerator,
    DataSource,
    Projection,
    Pipeline,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mapper => "mapper",
            Self::Token => "token",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "group_by",
            Self::Distinct => "distinct",
            Self::Enumerator => "enumerator",
            Self::DataSource => "data_source",
            Self::Projection => "projection",
            Self::Pipeline => "pipeline",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapper_errors_classify_as_malformed_continuation() {
        let err = QueryError::mapper(MapperError::TokenSpansMultipleRanges {
            token: EpkRange::new("00", "40"),
            overlapping: 2,
        });

        assert!(err.is_malformed_continuation());
        assert!(err.is_topology_inconsistency());
        assert_eq!(err.origin, ErrorOrigin::Mapper);
    }

    #[test]
    fn target_not_found_is_not_a_topology_inconsistency() {
        let err = QueryError::mapper(MapperError::TargetRangeNotFound {
            target: EpkRange::new("00", "40"),
            candidates: 3,
        });

        assert!(err.is_malformed_continuation());
        assert!(!err.is_topology_inconsistency());
    }

    #[test]
    fn partition_gone_is_detected_from_detail() {
        let err = QueryError::partition_gone(EpkRange::new("", "FF"));

        assert!(err.is_partition_gone());
        assert_eq!(err.class, ErrorClass::UpstreamPageFailure);

        let throttled = QueryError::upstream(UpstreamFailure::Throttled {
            retry_after_ms: Some(5),
        });
        assert!(!throttled.is_partition_gone());
    }

    #[test]
    fn display_with_class_prefixes_origin_and_class() {
        let err = QueryError::cancelled(ErrorOrigin::GroupBy);

        assert_eq!(
            err.display_with_class(),
            "group_by:cancelled: operation cancelled (group_by)"
        );
    }
}
