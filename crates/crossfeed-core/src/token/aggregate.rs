use crate::{
    error::QueryError,
    token::SourceToken,
    value::Value,
};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AggregateTokenWire {
    #[serde(rename = "SourceToken")]
    source_token: Value,
    #[serde(rename = "AggregationToken")]
    aggregation_token: Value,
}

///
/// AggregateContinuationToken
///
/// Resume point of a compute-environment aggregate stage: the child position
/// plus the running aggregator state.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregateContinuationToken {
    pub source: SourceToken,
    pub aggregation: Value,
}

impl AggregateContinuationToken {
    #[must_use]
    pub const fn new(source: SourceToken, aggregation: Value) -> Self {
        Self {
            source,
            aggregation,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "SourceToken": self.source.to_value(),
            "AggregationToken": self.aggregation,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let wire: AggregateTokenWire = serde_json::from_value(value.clone()).map_err(|err| {
            QueryError::malformed_token(format!("invalid aggregate continuation token: {err}"))
        })?;

        Ok(Self {
            source: SourceToken::from_value(&wire.source_token),
            aggregation: wire.aggregation_token,
        })
    }
}
