use crate::{
    error::{ErrorOrigin, QueryError},
    pipeline::distinct::DistinctType,
    value::{ContentHash, Value, hash_value},
};
use std::collections::HashSet;

fn parse_hash(value: &Value) -> Result<ContentHash, QueryError> {
    let Some(text) = value.as_str() else {
        return Err(QueryError::malformed(
            ErrorOrigin::Distinct,
            format!("distinct hash must be a string, found {value}"),
        ));
    };

    text.parse::<ContentHash>().map_err(|err| {
        QueryError::malformed(
            ErrorOrigin::Distinct,
            format!("invalid distinct hash '{text}': {err}"),
        )
    })
}

///
/// DistinctMap
///
/// Hashes of the documents already returned. `Ordered` input is sorted, so
/// duplicates are adjacent and only the last hash is kept. Distinct
/// documents that collide on the 128-bit hash count as duplicates.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DistinctMap {
    Ordered { last: Option<ContentHash> },
    Unordered { seen: HashSet<ContentHash> },
}

impl DistinctMap {
    /// Build a map, restoring it from `continuation` when present.
    ///
    /// Ordered maps save `null` or the last hash; unordered maps save the
    /// array of every hash seen.
    pub fn try_create(
        distinct_type: DistinctType,
        continuation: Option<&Value>,
    ) -> Result<Self, QueryError> {
        match distinct_type {
            DistinctType::None => Err(QueryError::invariant(
                ErrorOrigin::Distinct,
                "a distinct map needs an ordered or unordered distinct type",
            )),
            DistinctType::Ordered => {
                let last = match continuation {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(parse_hash(value)?),
                };

                Ok(Self::Ordered { last })
            }
            DistinctType::Unordered => {
                let seen = match continuation {
                    None => HashSet::new(),
                    Some(Value::Array(hashes)) => {
                        hashes.iter().map(parse_hash).collect::<Result<HashSet<_>, _>>()?
                    }
                    Some(other) => {
                        return Err(QueryError::malformed(
                            ErrorOrigin::Distinct,
                            format!("unordered distinct continuation must be an array, found {other}"),
                        ));
                    }
                };

                Ok(Self::Unordered { seen })
            }
        }
    }

    /// Record `document`; `true` when it was not seen before.
    pub fn add(&mut self, document: &Value) -> bool {
        let hash = hash_value(document);

        match self {
            Self::Ordered { last } => {
                if *last == Some(hash) {
                    return false;
                }
                *last = Some(hash);
                true
            }
            Self::Unordered { seen } => seen.insert(hash),
        }
    }

    #[must_use]
    pub fn continuation_state(&self) -> Value {
        match self {
            Self::Ordered { last } => last.map_or(Value::Null, |hash| Value::String(hash.to_string())),
            Self::Unordered { seen } => {
                let mut hashes = seen.iter().copied().collect::<Vec<_>>();
                hashes.sort_unstable();

                Value::Array(
                    hashes
                        .into_iter()
                        .map(|hash| Value::String(hash.to_string()))
                        .collect(),
                )
            }
        }
    }
}

///
/// TESTS
///
