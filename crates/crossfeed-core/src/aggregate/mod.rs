//! Module: aggregate
//! Responsibility: fold partial aggregate results from many partitions into
//! one group's final values, and checkpoint that fold as a continuation.
//! Does not own: how a partition computes its partial result.
//! Boundary: consumes rewritten payloads, produces final documents.

mod aggregators;


use crate::{
    error::{ErrorOrigin, QueryError},
    value::Value,
};
use aggregators::Aggregator;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::{collections::BTreeMap, fmt};

///
/// AggregateOperator
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum AggregateOperator {
    Average,
    Count,
    CountIf,
    Max,
    Min,
    MakeList,
    MakeSet,
    Sum,
}

impl fmt::Display for AggregateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Average => "AVG",
            Self::Count => "COUNT",
            Self::CountIf => "COUNTIF",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::MakeList => "MAKELIST",
            Self::MakeSet => "MAKESET",
            Self::Sum => "SUM",
        };
        write!(f, "{label}")
    }
}

///
/// AggregateShape
///
/// Projection layout the aggregator folds into: a single `SELECT VALUE`
/// expression, or an ordered select list where each alias is either an
/// aggregate or a scalar column.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregateShape {
    pub aggregates: Vec<AggregateOperator>,
    pub alias_to_aggregate: BTreeMap<String, Option<AggregateOperator>>,
    pub ordered_aliases: Vec<String>,
    pub has_select_value: bool,
}

impl AggregateShape {
    /// `SELECT VALUE <aggregate>`.
    #[must_use]
    pub fn select_value(operator: AggregateOperator) -> Self {
        Self {
            aggregates: vec![operator],
            has_select_value: true,
            ..Self::default()
        }
    }

    /// `SELECT VALUE <non-aggregate>`.
    #[must_use]
    pub fn select_value_scalar() -> Self {
        Self {
            has_select_value: true,
            ..Self::default()
        }
    }

    /// Select list in output order; `None` marks a scalar column.
    #[must_use]
    pub fn select_list<'a>(
        columns: impl IntoIterator<Item = (&'a str, Option<AggregateOperator>)>,
    ) -> Self {
        let mut shape = Self::default();
        for (alias, operator) in columns {
            shape.ordered_aliases.push(alias.to_string());
            shape.alias_to_aggregate.insert(alias.to_string(), operator);
            if let Some(operator) = operator {
                shape.aggregates.push(operator);
            }
        }

        shape
    }

    // Aliases in output order: declared order first, then any remaining
    // mapped aliases in key order.
    fn output_aliases(&self) -> Vec<(String, Option<AggregateOperator>)> {
        let mut columns = self
            .ordered_aliases
            .iter()
            .map(|alias| {
                let operator = self.alias_to_aggregate.get(alias).copied().flatten();
                (alias.clone(), operator)
            })
            .collect::<Vec<_>>();
        for (alias, operator) in &self.alias_to_aggregate {
            if !self.ordered_aliases.contains(alias) {
                columns.push((alias.clone(), *operator));
            }
        }

        columns
    }
}

///
/// ScalarValue
///
/// Non-aggregate column: every partition reports the same value, so the
/// first one seen is kept.
///

#[derive(Clone, Debug)]
struct ScalarValue {
    initialized: bool,
    value: Option<Value>,
}

impl ScalarValue {
    fn try_create(continuation: Option<&Value>) -> Result<Self, QueryError> {
        let Some(state) = continuation else {
            return Ok(Self {
                initialized: false,
                value: None,
            });
        };

        let initialized = state
            .get("initialized")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                QueryError::malformed(
                    ErrorOrigin::Aggregate,
                    format!("invalid scalar continuation state: {state}"),
                )
            })?;

        Ok(Self {
            initialized,
            value: state.get("value").cloned(),
        })
    }

    fn add_value(&mut self, value: Option<&Value>) {
        if !self.initialized {
            self.value = value.cloned();
            self.initialized = true;
        }
    }

    fn continuation_state(&self) -> Value {
        let mut state = Map::new();
        state.insert("initialized".to_string(), Value::Bool(self.initialized));
        if let Some(value) = &self.value {
            state.insert("value".to_string(), value.clone());
        }

        Value::Object(state)
    }
}

///
/// AggregateValue
///

#[derive(Clone, Debug)]
enum AggregateValue {
    Aggregate(Aggregator),
    Scalar(ScalarValue),
}

impl AggregateValue {
    fn try_create(
        operator: Option<AggregateOperator>,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        Ok(match operator {
            Some(operator) => Self::Aggregate(Aggregator::try_create(operator, continuation)?),
            None => Self::Scalar(ScalarValue::try_create(continuation)?),
        })
    }

    // Aggregate partials arrive wrapped as `{"item": partial}`; a missing
    // item is undefined.
    fn add_value(&mut self, value: Option<&Value>) -> Result<(), QueryError> {
        match self {
            Self::Aggregate(aggregator) => {
                let item = match value {
                    None => None,
                    Some(Value::Object(wrapper)) => wrapper.get("item"),
                    Some(other) => {
                        return Err(QueryError::malformed_projection(format!(
                            "aggregate partial must be an object with an 'item' field: {other}"
                        )));
                    }
                };
                aggregator.aggregate(item)
            }
            Self::Scalar(scalar) => {
                scalar.add_value(value);
                Ok(())
            }
        }
    }

    fn result(&self) -> Option<Value> {
        match self {
            Self::Aggregate(aggregator) => aggregator.result(),
            Self::Scalar(scalar) => scalar.value.clone(),
        }
    }

    fn continuation_state(&self) -> Value {
        match self {
            Self::Aggregate(aggregator) => aggregator.continuation_state(),
            Self::Scalar(scalar) => scalar.continuation_state(),
        }
    }
}

///
/// SingleGroupAggregator
///
/// Folds the payloads of one group (or of the whole query when there is no
/// GROUP BY) into its final result.
///

#[derive(Clone, Debug)]
pub struct SingleGroupAggregator {
    projection: GroupProjection,
}

#[derive(Clone, Debug)]
enum GroupProjection {
    SelectValue(AggregateValue),
    SelectList(Vec<(String, AggregateValue)>),
}

impl SingleGroupAggregator {
    /// Create an aggregator, resuming from `continuation` when present.
    pub fn try_create(shape: &AggregateShape, continuation: Option<&Value>) -> Result<Self, QueryError> {
        if shape.has_select_value {
            let operator = shape.aggregates.first().copied();
            let value = AggregateValue::try_create(operator, continuation)?;
            return Ok(Self {
                projection: GroupProjection::SelectValue(value),
            });
        }

        let state = match continuation {
            None => None,
            Some(Value::Object(state)) => Some(state),
            Some(other) => {
                return Err(QueryError::malformed(
                    ErrorOrigin::Aggregate,
                    format!("select list continuation must be an object: {other}"),
                ));
            }
        };

        let mut columns = Vec::new();
        for (alias, operator) in shape.output_aliases() {
            let alias_state = match state {
                None => None,
                Some(state) => Some(state.get(&alias).ok_or_else(|| {
                    QueryError::malformed(
                        ErrorOrigin::Aggregate,
                        format!("select list continuation is missing alias '{alias}'"),
                    )
                })?),
            };
            let value = AggregateValue::try_create(operator, alias_state)?;
            columns.push((alias, value));
        }

        Ok(Self {
            projection: GroupProjection::SelectList(columns),
        })
    }

    /// Fold one rewritten payload into the group.
    pub fn add_values(&mut self, payload: &Value) -> Result<(), QueryError> {
        match &mut self.projection {
            GroupProjection::SelectValue(value) => value.add_value(Some(payload)),
            GroupProjection::SelectList(columns) => {
                let Some(payload) = payload.as_object() else {
                    return Err(QueryError::malformed_projection(format!(
                        "select list payload must be an object: {payload}"
                    )));
                };
                for (alias, value) in columns {
                    value.add_value(payload.get(alias.as_str()))?;
                }

                Ok(())
            }
        }
    }

    /// Final result; `None` when a `SELECT VALUE` result is undefined.
    /// Undefined select-list columns are omitted from the object.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        match &self.projection {
            GroupProjection::SelectValue(value) => value.result(),
            GroupProjection::SelectList(columns) => {
                let mut object = Map::new();
                for (alias, value) in columns {
                    if let Some(result) = value.result() {
                        object.insert(alias.clone(), result);
                    }
                }

                Some(Value::Object(object))
            }
        }
    }

    #[must_use]
    pub fn continuation_state(&self) -> Value {
        match &self.projection {
            GroupProjection::SelectValue(value) => value.continuation_state(),
            GroupProjection::SelectList(columns) => {
                let mut object = Map::new();
                for (alias, value) in columns {
                    object.insert(alias.clone(), value.continuation_state());
                }

                Value::Object(object)
            }
        }
    }
}
