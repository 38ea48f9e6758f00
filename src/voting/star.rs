use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VoteError};
use crate::voting::numeric;

pub const MIN_STARS: u8 = 1;
pub const MAX_STARS: u8 = 5;

/// A star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct StarRating(u8);

impl StarRating {
    pub fn new(stars: i64) -> Option<Self> {
        (i64::from(MIN_STARS)..=i64::from(MAX_STARS))
            .contains(&stars)
            .then(|| StarRating(stars as u8))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for StarRating {
    type Error = String;

    fn try_from(stars: i64) -> std::result::Result<Self, Self::Error> {
        StarRating::new(stars).ok_or_else(|| format!("star rating {} is outside 1-5", stars))
    }
}

impl From<StarRating> for i64 {
    fn from(rating: StarRating) -> i64 {
        i64::from(rating.0)
    }
}

/// Integers, decimals and numeric strings are accepted; in-range decimals round to the nearest star.
pub fn coerce(value: &Value) -> Result<StarRating> {
    let number = numeric(value)
        .ok_or_else(|| VoteError::invalid(format!("star rating must be numeric, got {}", value)))?;
    // Check range before rounding: 5.4 is out of range, not 5.
    if number < f64::from(MIN_STARS) || number > f64::from(MAX_STARS) {
        return Err(VoteError::invalid(format!("star rating {} is outside 1-5", value)));
    }
    StarRating::new(number.round() as i64)
        .ok_or_else(|| VoteError::invalid(format!("star rating {} is outside 1-5", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_are_coerced() {
        assert_eq!(coerce(&json!("4")).unwrap().get(), 4);
        assert_eq!(coerce(&json!(" 2 ")).unwrap().get(), 2);
    }

    #[test]
    fn decimals_round() {
        assert_eq!(coerce(&json!(3.0)).unwrap().get(), 3);
        assert_eq!(coerce(&json!("4.6")).unwrap().get(), 5);
    }

    #[test]
    fn out_of_range_and_garbage_are_invalid() {
        for bad in [json!("6"), json!(0), json!(-3), json!("four"), json!(null), json!(5.7)] {
            assert!(matches!(coerce(&bad), Err(VoteError::InvalidInput(_))), "{bad}");
        }
    }

    #[test]
    fn decimals_just_outside_the_range_are_invalid() {
        for bad in [json!(5.4), json!("0.6"), json!(0.5)] {
            assert!(matches!(coerce(&bad), Err(VoteError::InvalidInput(_))), "{bad}");
        }
    }

    #[test]
    fn deserializing_checks_range() {
        assert!(serde_json::from_str::<StarRating>("5").is_ok());
        assert!(serde_json::from_str::<StarRating>("6").is_err());
    }
}
