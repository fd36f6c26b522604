use crate::{
    aggregate::{AggregateShape, SingleGroupAggregator},
    error::{ErrorClass, ErrorOrigin, QueryError},
    pipeline::projection::GroupByRow,
    value::{ContentHash, Value, hash_value},
};
use serde_json::Map;
use std::collections::{BTreeMap, btree_map::Entry};

///
/// GroupingTable
///
/// Groups keyed by the content hash of their `groupByItems` tuple. Distinct
/// tuples that collide on the 128-bit hash share one group. Drains in
/// ascending hash order.
///

#[derive(Clone, Debug)]
pub struct GroupingTable {
    shape: AggregateShape,
    groups: BTreeMap<ContentHash, SingleGroupAggregator>,
    max_groups: Option<usize>,
}

impl GroupingTable {
    /// Build a table, restoring groups from `continuation` when present.
    pub fn try_create(
        shape: AggregateShape,
        max_groups: Option<usize>,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        let mut groups = BTreeMap::new();

        if let Some(continuation) = continuation {
            let Some(entries) = continuation.as_object() else {
                return Err(QueryError::malformed(
                    ErrorOrigin::GroupBy,
                    "grouping table continuation must be an object",
                ));
            };

            for (key, state) in entries {
                let hash = key.parse::<ContentHash>().map_err(|err| {
                    QueryError::malformed(
                        ErrorOrigin::GroupBy,
                        format!("invalid group key hash '{key}': {err}"),
                    )
                })?;
                let aggregator = SingleGroupAggregator::try_create(&shape, Some(state))?;
                groups.insert(hash, aggregator);
            }
        }

        Ok(Self {
            shape,
            groups,
            max_groups,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Fold one page of rows.
    ///
    /// The page is applied to staged copies of the touched groups and
    /// committed only when every row folded, so a failing page leaves the
    /// table unchanged.
    pub(crate) fn add_rows(&mut self, rows: Vec<GroupByRow>) -> Result<(), QueryError> {
        let mut staged: BTreeMap<ContentHash, SingleGroupAggregator> = BTreeMap::new();

        for row in rows {
            let hash = hash_value(&row.group_by_items);
            let aggregator = match staged.entry(hash) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let base = match self.groups.get(&hash) {
                        Some(existing) => existing.clone(),
                        None => SingleGroupAggregator::try_create(&self.shape, None)?,
                    };
                    entry.insert(base)
                }
            };
            aggregator.add_values(&row.payload)?;
        }

        if let Some(max_groups) = self.max_groups {
            let new_groups = staged
                .keys()
                .filter(|hash| !self.groups.contains_key(hash))
                .count();
            if self.groups.len() + new_groups > max_groups {
                return Err(QueryError::new(
                    ErrorClass::LimitExceeded,
                    ErrorOrigin::GroupBy,
                    format!(
                        "grouping table limit exceeded: {} groups (max {max_groups})",
                        self.groups.len() + new_groups
                    ),
                ));
            }
        }

        self.groups.extend(staged);

        Ok(())
    }

    /// Remove up to `max_groups` groups and return their results.
    ///
    /// Groups whose `SELECT VALUE` result is undefined produce no document.
    pub fn drain(&mut self, max_groups: usize) -> Vec<Value> {
        let mut results = Vec::with_capacity(max_groups.min(self.groups.len()));
        for _ in 0..max_groups {
            let Some((_, aggregator)) = self.groups.pop_first() else {
                break;
            };
            if let Some(result) = aggregator.result() {
                results.push(result);
            }
        }

        results
    }

    /// `{ "<hash hex>": <aggregator state>, ... }`
    #[must_use]
    pub fn continuation_state(&self) -> Value {
        let mut object = Map::new();
        for (hash, aggregator) in &self.groups {
            object.insert(hash.to_string(), aggregator.continuation_state());
        }

        Value::Object(object)
    }
}

///
/// TESTS
///
