use crate::{
    error::QueryError,
    token::SourceToken,
    value::Value,
};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupByTokenWire {
    #[serde(rename = "SourceToken")]
    source_token: Value,
    #[serde(rename = "GroupingTableContinuationToken")]
    grouping_table: Value,
}

///
/// GroupByContinuationToken
///
/// Resume point of a compute-environment group-by stage: the child position
/// plus the serialized grouping table.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupByContinuationToken {
    pub source: SourceToken,
    pub grouping_table: Value,
}

impl GroupByContinuationToken {
    #[must_use]
    pub const fn new(source: SourceToken, grouping_table: Value) -> Self {
        Self {
            source,
            grouping_table,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "SourceToken": self.source.to_value(),
            "GroupingTableContinuationToken": self.grouping_table,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let wire: GroupByTokenWire = serde_json::from_value(value.clone()).map_err(|err| {
            QueryError::malformed_token(format!("invalid group-by continuation token: {err}"))
        })?;

        if !wire.grouping_table.is_object() {
            return Err(QueryError::malformed_token(
                "grouping table continuation must be an object",
            ));
        }

        Ok(Self {
            source: SourceToken::from_value(&wire.source_token),
            grouping_table: wire.grouping_table,
        })
    }
}
