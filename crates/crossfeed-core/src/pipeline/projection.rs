//! Rewritten projections.
//!
//! Partitions return aggregate and group-by queries in a rewritten shape
//! that carries partial results; these helpers take that shape apart and
//! reject anything else.

use crate::{error::QueryError, value::Value};

const GROUP_BY_ITEMS_KEY: &str = "groupByItems";
const PAYLOAD_KEY: &str = "payload";

///
/// GroupByRow
///
/// `{"groupByItems": [...], "payload": ...}`
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GroupByRow {
    pub group_by_items: Value,
    pub payload: Value,
}

pub(crate) fn group_by_row(document: Value) -> Result<GroupByRow, QueryError> {
    let Value::Object(mut object) = document else {
        return Err(QueryError::malformed_projection(format!(
            "group by projection must be an object: {document}"
        )));
    };

    let group_by_items = match object.remove(GROUP_BY_ITEMS_KEY) {
        Some(items @ Value::Array(_)) => items,
        Some(other) => {
            return Err(QueryError::malformed_projection(format!(
                "groupByItems must be an array: {other}"
            )));
        }
        None => {
            return Err(QueryError::malformed_projection(
                "group by projection is missing groupByItems",
            ));
        }
    };
    let payload = object.remove(PAYLOAD_KEY).ok_or_else(|| {
        QueryError::malformed_projection("group by projection is missing payload")
    })?;

    Ok(GroupByRow {
        group_by_items,
        payload,
    })
}

/// Extract the aggregate payload from one rewritten document.
///
/// `SELECT VALUE` queries come back as `[{"item": partial}]` and the payload
/// is the first element; select-list queries come back as
/// `{"payload": {alias: {"item": partial}}}`.
pub(crate) fn aggregate_payload(document: Value, is_value_query: bool) -> Result<Value, QueryError> {
    if is_value_query {
        let Value::Array(items) = document else {
            return Err(QueryError::malformed_projection(format!(
                "value aggregate projection must be an array: {document}"
            )));
        };

        return items.into_iter().next().ok_or_else(|| {
            QueryError::malformed_projection("value aggregate projection is empty")
        });
    }

    let Value::Object(mut object) = document else {
        return Err(QueryError::malformed_projection(format!(
            "aggregate projection must be an object: {document}"
        )));
    };

    object
        .remove(PAYLOAD_KEY)
        .ok_or_else(|| QueryError::malformed_projection("aggregate projection is missing payload"))
}

///
/// TESTS
///
