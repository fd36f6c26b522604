use crate::{
    aggregate::AggregateOperator,
    error::{ErrorOrigin, QueryError},
    value::{ContentHash, Value, as_number, compare_primitives, hash_value, number},
};
use serde_json::json;
use std::{cmp::Ordering, collections::HashSet};

fn malformed_state(operator: AggregateOperator, state: &Value) -> QueryError {
    QueryError::malformed(
        ErrorOrigin::Aggregate,
        format!("invalid {operator} continuation state: {state}"),
    )
}

fn unexpected_partial(operator: AggregateOperator, partial: &Value) -> QueryError {
    QueryError::invariant(
        ErrorOrigin::Aggregate,
        format!("unexpected {operator} partial result: {partial}"),
    )
}

fn number_or_null(x: f64) -> Value {
    number(x).unwrap_or(Value::Null)
}

///
/// Aggregator
///
/// Running state of one aggregate function across partial results.
/// `None` partials are undefined (the partition produced no value).
///

#[derive(Clone, Debug)]
pub(crate) enum Aggregator {
    Sum(SumAggregator),
    Count(CountAggregator),
    Average(AverageAggregator),
    MinMax(MinMaxAggregator),
    MakeList(MakeListAggregator),
    MakeSet(MakeSetAggregator),
}

impl Aggregator {
    pub(crate) fn try_create(
        operator: AggregateOperator,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        Ok(match operator {
            AggregateOperator::Sum => Self::Sum(SumAggregator::try_create(continuation)?),
            AggregateOperator::Count | AggregateOperator::CountIf => {
                Self::Count(CountAggregator::try_create(operator, continuation)?)
            }
            AggregateOperator::Average => {
                Self::Average(AverageAggregator::try_create(continuation)?)
            }
            AggregateOperator::Min | AggregateOperator::Max => {
                Self::MinMax(MinMaxAggregator::try_create(operator, continuation)?)
            }
            AggregateOperator::MakeList => {
                Self::MakeList(MakeListAggregator::try_create(continuation)?)
            }
            AggregateOperator::MakeSet => {
                Self::MakeSet(MakeSetAggregator::try_create(continuation)?)
            }
        })
    }

    pub(crate) fn aggregate(&mut self, partial: Option<&Value>) -> Result<(), QueryError> {
        match self {
            Self::Sum(inner) => {
                inner.aggregate(partial);
                Ok(())
            }
            Self::Count(inner) => inner.aggregate(partial),
            Self::Average(inner) => inner.aggregate(partial),
            Self::MinMax(inner) => {
                inner.aggregate(partial);
                Ok(())
            }
            Self::MakeList(inner) => inner.aggregate(partial),
            Self::MakeSet(inner) => inner.aggregate(partial),
        }
    }

    pub(crate) fn result(&self) -> Option<Value> {
        match self {
            Self::Sum(inner) => inner.result(),
            Self::Count(inner) => Some(inner.result()),
            Self::Average(inner) => inner.result(),
            Self::MinMax(inner) => inner.result(),
            Self::MakeList(inner) => Some(inner.result()),
            Self::MakeSet(inner) => Some(inner.result()),
        }
    }

    pub(crate) fn continuation_state(&self) -> Value {
        match self {
            Self::Sum(inner) => inner.continuation_state(),
            Self::Count(inner) => inner.continuation_state(),
            Self::Average(inner) => inner.continuation_state(),
            Self::MinMax(inner) => inner.continuation_state(),
            Self::MakeList(inner) => inner.continuation_state(),
            Self::MakeSet(inner) => inner.continuation_state(),
        }
    }
}

///
/// SumAggregator
///
/// `None` once any partial is undefined or non-numeric.
///

#[derive(Clone, Debug)]
pub(crate) struct SumAggregator {
    sum: Option<f64>,
}

impl SumAggregator {
    fn try_create(continuation: Option<&Value>) -> Result<Self, QueryError> {
        let sum = match continuation {
            None => Some(0.0),
            Some(Value::Null) => None,
            Some(state) => Some(
                as_number(state)
                    .ok_or_else(|| malformed_state(AggregateOperator::Sum, state))?,
            ),
        };

        Ok(Self { sum })
    }

    fn aggregate(&mut self, partial: Option<&Value>) {
        let Some(sum) = self.sum else {
            return;
        };

        self.sum = partial.and_then(as_number).map(|x| sum + x);
    }

    fn result(&self) -> Option<Value> {
        self.sum.and_then(number)
    }

    fn continuation_state(&self) -> Value {
        self.sum.map_or(Value::Null, number_or_null)
    }
}

///
/// CountAggregator
///

#[derive(Clone, Debug)]
pub(crate) struct CountAggregator {
    operator: AggregateOperator,
    count: i64,
}

impl CountAggregator {
    fn try_create(
        operator: AggregateOperator,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        let count = match continuation {
            None => 0,
            Some(state) => state
                .as_i64()
                .ok_or_else(|| malformed_state(operator, state))?,
        };

        Ok(Self { operator, count })
    }

    #[expect(clippy::cast_possible_truncation)]
    fn aggregate(&mut self, partial: Option<&Value>) -> Result<(), QueryError> {
        let Some(partial) = partial else {
            return Ok(());
        };
        let local = match partial.as_i64() {
            Some(local) => local,
            None => as_number(partial)
                .filter(|x| x.fract() == 0.0)
                .map(|x| x as i64)
                .ok_or_else(|| unexpected_partial(self.operator, partial))?,
        };

        self.count = self.count.saturating_add(local);

        Ok(())
    }

    fn result(&self) -> Value {
        Value::from(self.count)
    }

    fn continuation_state(&self) -> Value {
        Value::from(self.count)
    }
}

///
/// AverageAggregator
///
/// Running `(sum, count)`; divided only when the result is read.
///

#[derive(Clone, Debug)]
pub(crate) struct AverageAggregator {
    sum: Option<f64>,
    count: i64,
}

impl AverageAggregator {
    fn try_create(continuation: Option<&Value>) -> Result<Self, QueryError> {
        match continuation {
            None => Ok(Self {
                sum: Some(0.0),
                count: 0,
            }),
            Some(state) => {
                let (sum, count) = Self::read_info(state)
                    .ok_or_else(|| malformed_state(AggregateOperator::Average, state))?;
                Ok(Self { sum, count })
            }
        }
    }

    // `{"sum": number | null, "count": integer}`; a missing sum is undefined.
    fn read_info(value: &Value) -> Option<(Option<f64>, i64)> {
        let object = value.as_object()?;
        let count = object.get("count")?.as_i64()?;
        let sum = match object.get("sum") {
            None | Some(Value::Null) => None,
            Some(sum) => Some(as_number(sum)?),
        };

        Some((sum, count))
    }

    fn aggregate(&mut self, partial: Option<&Value>) -> Result<(), QueryError> {
        let Some(partial) = partial else {
            return Ok(());
        };
        let (sum, count) = Self::read_info(partial)
            .ok_or_else(|| unexpected_partial(AggregateOperator::Average, partial))?;

        self.sum = match (self.sum, sum) {
            (Some(global), Some(local)) => Some(global + local),
            _ => None,
        };
        self.count = self.count.saturating_add(count);

        Ok(())
    }

    #[expect(clippy::cast_precision_loss)]
    fn result(&self) -> Option<Value> {
        if self.count <= 0 {
            return None;
        }

        self.sum.and_then(|sum| number(sum / self.count as f64))
    }

    fn continuation_state(&self) -> Value {
        json!({
            "sum": self.sum.map_or(Value::Null, number_or_null),
            "count": self.count,
        })
    }
}

///
/// MinMaxValue
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum MinMaxValue {
    /// No partial seen yet.
    Unset,
    Value(Value),
    /// A non-primitive value was seen; the result is undefined for good.
    Undefined,
}

///
/// MinMaxAggregator
///
/// Compares partials under the cross-type primitive ordering. Partials of
/// the form `{"min"|"max": v, "count": n}` with `n == 0` come from empty
/// partitions and are skipped.
///

#[derive(Clone, Debug)]
pub(crate) struct MinMaxAggregator {
    operator: AggregateOperator,
    value: MinMaxValue,
}

impl MinMaxAggregator {
    fn try_create(
        operator: AggregateOperator,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        let value = match continuation {
            None => MinMaxValue::Unset,
            Some(state) => {
                let kind = state.get("type").and_then(Value::as_str);
                match (kind, state.get("value")) {
                    (Some("Unset"), _) => MinMaxValue::Unset,
                    (Some("Undefined"), _) => MinMaxValue::Undefined,
                    (Some("Value"), Some(value)) => MinMaxValue::Value(value.clone()),
                    _ => return Err(malformed_state(operator, state)),
                }
            }
        };

        Ok(Self { operator, value })
    }

    const fn is_min(&self) -> bool {
        matches!(self.operator, AggregateOperator::Min)
    }

    fn aggregate(&mut self, partial: Option<&Value>) {
        if self.value == MinMaxValue::Undefined {
            return;
        }

        let key = if self.is_min() { "min" } else { "max" };
        let candidate = match partial {
            Some(Value::Object(object)) if object.contains_key("count") => {
                if object.get("count").and_then(as_number) == Some(0.0) {
                    return;
                }
                object.get(key)
            }
            other => other,
        };

        let Some(candidate) = candidate.filter(|c| !c.is_array() && !c.is_object()) else {
            self.value = MinMaxValue::Undefined;
            return;
        };

        let replace = match &self.value {
            MinMaxValue::Unset => true,
            MinMaxValue::Value(current) => {
                let wanted = if self.is_min() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                compare_primitives(candidate, current) == Some(wanted)
            }
            MinMaxValue::Undefined => false,
        };
        if replace {
            self.value = MinMaxValue::Value(candidate.clone());
        }
    }

    fn result(&self) -> Option<Value> {
        match &self.value {
            MinMaxValue::Value(value) => Some(value.clone()),
            MinMaxValue::Unset | MinMaxValue::Undefined => None,
        }
    }

    fn continuation_state(&self) -> Value {
        match &self.value {
            MinMaxValue::Unset => json!({ "type": "Unset" }),
            MinMaxValue::Value(value) => json!({ "type": "Value", "value": value }),
            MinMaxValue::Undefined => json!({ "type": "Undefined" }),
        }
    }
}

fn read_list(operator: AggregateOperator, continuation: Option<&Value>) -> Result<Vec<Value>, QueryError> {
    match continuation {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(state) => Err(malformed_state(operator, state)),
    }
}

///
/// MakeListAggregator
///

#[derive(Clone, Debug)]
pub(crate) struct MakeListAggregator {
    items: Vec<Value>,
}

impl MakeListAggregator {
    fn try_create(continuation: Option<&Value>) -> Result<Self, QueryError> {
        Ok(Self {
            items: read_list(AggregateOperator::MakeList, continuation)?,
        })
    }

    fn aggregate(&mut self, partial: Option<&Value>) -> Result<(), QueryError> {
        match partial {
            None => Ok(()),
            Some(Value::Array(items)) => {
                self.items.extend(items.iter().cloned());
                Ok(())
            }
            Some(other) => Err(unexpected_partial(AggregateOperator::MakeList, other)),
        }
    }

    fn result(&self) -> Value {
        Value::Array(self.items.clone())
    }

    fn continuation_state(&self) -> Value {
        self.result()
    }
}

///
/// MakeSetAggregator
///
/// Distinct by content hash, first occurrence kept.
///

#[derive(Clone, Debug)]
pub(crate) struct MakeSetAggregator {
    items: Vec<Value>,
    seen: HashSet<ContentHash>,
}

impl MakeSetAggregator {
    fn try_create(continuation: Option<&Value>) -> Result<Self, QueryError> {
        let mut aggregator = Self {
            items: Vec::new(),
            seen: HashSet::new(),
        };
        for item in read_list(AggregateOperator::MakeSet, continuation)? {
            aggregator.insert(item);
        }

        Ok(aggregator)
    }

    fn insert(&mut self, item: Value) {
        if self.seen.insert(hash_value(&item)) {
            self.items.push(item);
        }
    }

    fn aggregate(&mut self, partial: Option<&Value>) -> Result<(), QueryError> {
        match partial {
            None => Ok(()),
            Some(Value::Array(items)) => {
                for item in items {
                    self.insert(item.clone());
                }
                Ok(())
            }
            Some(other) => Err(unexpected_partial(AggregateOperator::MakeSet, other)),
        }
    }

    fn result(&self) -> Value {
        Value::Array(self.items.clone())
    }

    fn continuation_state(&self) -> Value {
        self.result()
    }
}
