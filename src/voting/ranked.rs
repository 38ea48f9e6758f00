use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VoteError};
use crate::voting::numeric;

/// A 1-based position in a voter's ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rank(u32);

impl Rank {
    pub fn new(rank: i64) -> Option<Self> {
        u32::try_from(rank).ok().filter(|r| *r > 0).map(Rank)
    }

    /// Rank of the element at `index` in an ordered list.
    pub fn from_index(index: usize) -> Self {
        Rank(index as u32 + 1)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Rank {
    type Error = String;

    fn try_from(rank: i64) -> std::result::Result<Self, Self::Error> {
        Rank::new(rank).ok_or_else(|| format!("rank {} is not a positive integer", rank))
    }
}

impl From<Rank> for i64 {
    fn from(rank: Rank) -> i64 {
        i64::from(rank.0)
    }
}

/// Ranks must be positive whole numbers; numeric strings are accepted.
pub fn coerce(value: &Value) -> Result<Rank> {
    let number = numeric(value)
        .ok_or_else(|| VoteError::invalid(format!("rank must be numeric, got {}", value)))?;
    if number.fract() != 0.0 {
        return Err(VoteError::invalid(format!("rank {} is not a whole number", value)));
    }
    Rank::new(number as i64)
        .ok_or_else(|| VoteError::invalid(format!("rank {} is not positive", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positive_integers_only() {
        assert_eq!(coerce(&json!(1)).unwrap().get(), 1);
        assert_eq!(coerce(&json!("12")).unwrap().get(), 12);

        for bad in [json!(0), json!(-2), json!(1.5), json!("first"), json!(true)] {
            assert!(matches!(coerce(&bad), Err(VoteError::InvalidInput(_))), "{bad}");
        }
    }

    #[test]
    fn index_to_rank() {
        assert_eq!(Rank::from_index(0).get(), 1);
        assert_eq!(Rank::from_index(4).get(), 5);
    }
}
