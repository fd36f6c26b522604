use crate::{
    error::QueryError,
    range::{EpkRange, FeedRange, PartitionKeyRange, mapper::PartitionedToken},
    token::QueryState,
    value::Value,
};
use serde_json::{Map, json};

const RANGE_KEY: &str = "Range";
const PK_RANGE_ID_KEY: &str = "PKRangeId";
const PK_KEY: &str = "PK";
const FEED_RANGE_KEY: &str = "FeedRange";
const STATE_KEY: &str = "State";

fn range_to_value(range: &EpkRange) -> Value {
    json!({ "min": range.min, "max": range.max })
}

fn range_from_value(value: &Value) -> Result<EpkRange, QueryError> {
    let bound = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                QueryError::malformed_token(format!("feed range is missing string bound '{key}'"))
            })
    };

    Ok(EpkRange::new(bound("min")?, bound("max")?))
}

impl FeedRange {
    /// Wire descriptor of this feed range.
    #[must_use]
    pub fn to_descriptor(&self) -> Value {
        match self {
            Self::Epk(range) => json!({ RANGE_KEY: range_to_value(range) }),
            Self::PartitionKeyRange(pk_range) => json!({
                PK_RANGE_ID_KEY: pk_range.id,
                RANGE_KEY: range_to_value(&pk_range.range),
            }),
            Self::LogicalPartitionKey(pk) => json!({ PK_KEY: pk }),
        }
    }

    pub fn from_descriptor(value: &Value) -> Result<Self, QueryError> {
        let Some(object) = value.as_object() else {
            return Err(QueryError::malformed_token("feed range must be an object"));
        };

        if let Some(pk) = object.get(PK_KEY) {
            return Ok(Self::LogicalPartitionKey(pk.clone()));
        }

        let range = object
            .get(RANGE_KEY)
            .ok_or_else(|| QueryError::malformed_token("feed range is missing 'Range'"))
            .and_then(range_from_value)?;
        if range.is_empty() {
            return Err(QueryError::malformed_token(format!(
                "feed range {range} is empty"
            )));
        }

        match object.get(PK_RANGE_ID_KEY) {
            Some(Value::String(id)) => Ok(Self::PartitionKeyRange(PartitionKeyRange::new(
                id.clone(),
                range,
            ))),
            Some(_) => Err(QueryError::malformed_token(
                "partition key range id must be a string",
            )),
            None => Ok(Self::Epk(range)),
        }
    }
}

///
/// FeedRangeState
///
/// One pending feed range and the continuation to resume it from. A `None`
/// state means the range has not been read yet.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeedRangeState {
    pub feed_range: FeedRange,
    pub state: Option<QueryState>,
}

impl FeedRangeState {
    #[must_use]
    pub const fn new(feed_range: FeedRange, state: Option<QueryState>) -> Self {
        Self { feed_range, state }
    }

    #[must_use]
    pub const fn unstarted(feed_range: FeedRange) -> Self {
        Self::new(feed_range, None)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(FEED_RANGE_KEY.to_string(), self.feed_range.to_descriptor());
        object.insert(
            STATE_KEY.to_string(),
            self.state
                .as_ref()
                .map_or(Value::Null, |state| (**state).clone()),
        );

        Value::Object(object)
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let Some(object) = value.as_object() else {
            return Err(QueryError::malformed_token(
                "feed range state must be an object",
            ));
        };
        let feed_range = object
            .get(FEED_RANGE_KEY)
            .ok_or_else(|| QueryError::malformed_token("feed range state is missing 'FeedRange'"))
            .and_then(FeedRange::from_descriptor)?;
        let state = match object.get(STATE_KEY) {
            None | Some(Value::Null) => None,
            Some(state) => Some(QueryState::new(state.clone())),
        };

        Ok(Self::new(feed_range, state))
    }
}

///
/// CrossFeedRangeState
///
/// Continuation of a cross-partition enumeration: every range still pending
/// when the page was produced, unstarted ones included.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrossFeedRangeState(Vec<FeedRangeState>);

impl CrossFeedRangeState {
    /// Build a state from pending ranges; `None` when nothing is pending.
    #[must_use]
    pub fn from_pending(pending: Vec<FeedRangeState>) -> Option<Self> {
        (!pending.is_empty()).then_some(Self(pending))
    }

    #[must_use]
    pub fn ranges(&self) -> &[FeedRangeState] {
        &self.0
    }

    #[must_use]
    pub fn into_ranges(self) -> Vec<FeedRangeState> {
        self.0
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().map(FeedRangeState::to_value).collect())
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let Some(items) = value.as_array() else {
            return Err(QueryError::malformed_token(
                "cross-partition continuation must be an array",
            ));
        };
        if items.is_empty() {
            return Err(QueryError::malformed_token(
                "cross-partition continuation lists no feed ranges",
            ));
        }

        let ranges = items
            .iter()
            .map(FeedRangeState::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        for (i, left) in ranges.iter().enumerate() {
            if let Some(right) = ranges[i + 1..]
                .iter()
                .find(|right| right.feed_range.overlaps(&left.feed_range))
            {
                return Err(QueryError::malformed_token(format!(
                    "feed range {} overlaps feed range {}",
                    left.feed_range, right.feed_range
                )));
            }
        }

        Ok(Self(ranges))
    }
}

///
/// RangeToken
///
/// Interval-bearing feed range state in the shape the mapper consumes.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeToken {
    pub feed_range: FeedRange,
    pub range: EpkRange,
    pub state: Option<QueryState>,
}

impl RangeToken {
    /// Convert a feed range state, `None` for logical partition keys.
    #[must_use]
    pub fn from_state(state: &FeedRangeState) -> Option<Self> {
        let range = state.feed_range.epk_range()?.clone();

        Some(Self {
            feed_range: state.feed_range.clone(),
            range,
            state: state.state.clone(),
        })
    }

    /// Feed range state resuming this token over `tile`.
    ///
    /// The original feed range is kept when the tile still matches it
    /// exactly and it is one of the `live` ranges; otherwise the tile is
    /// addressed by key interval, since its partition was split or merged.
    #[must_use]
    pub fn resume_over(self, tile: EpkRange, live: &[FeedRange]) -> FeedRangeState {
        let feed_range = if tile == self.range && live.contains(&self.feed_range) {
            self.feed_range
        } else {
            FeedRange::Epk(tile)
        };

        FeedRangeState::new(feed_range, self.state)
    }
}

impl PartitionedToken for RangeToken {
    fn range(&self) -> &EpkRange {
        &self.range
    }
}
