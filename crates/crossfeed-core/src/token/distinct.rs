use crate::{error::QueryError, token::SourceToken, value::Value};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DistinctTokenWire {
    #[serde(rename = "SourceToken")]
    source_token: Value,
    #[serde(rename = "DistinctMapToken")]
    distinct_map_token: Value,
}

///
/// DistinctContinuationToken
///
/// Resume point of a compute-environment distinct stage: the child position
/// plus the hashes already returned.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DistinctContinuationToken {
    pub source: SourceToken,
    pub distinct_map: Value,
}

impl DistinctContinuationToken {
    #[must_use]
    pub const fn new(source: SourceToken, distinct_map: Value) -> Self {
        Self {
            source,
            distinct_map,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "SourceToken": self.source.to_value(),
            "DistinctMapToken": self.distinct_map,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let wire: DistinctTokenWire = serde_json::from_value(value.clone()).map_err(|err| {
            QueryError::malformed_token(format!("invalid distinct continuation token: {err}"))
        })?;

        Ok(Self {
            source: SourceToken::from_value(&wire.source_token),
            distinct_map: wire.distinct_map_token,
        })
    }
}
