pub mod approval;
pub mod binary;
pub mod ranked;
pub mod star;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VoteError};
use crate::models::VotingSystem;

pub use binary::BinaryChoice;
pub use ranked::Rank;
pub use star::StarRating;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "system", content = "value", rename_all = "snake_case")]
pub enum VoteValue {
    Binary(BinaryChoice),
    /// Presence is the vote; there is nothing else to record.
    Approval,
    Star(StarRating),
    Ranked(Rank),
}

impl VoteValue {
    pub fn system(&self) -> VotingSystem {
        match self {
            VoteValue::Binary(_) => VotingSystem::Binary,
            VoteValue::Approval => VotingSystem::Approval,
            VoteValue::Star(_) => VotingSystem::Star,
            VoteValue::Ranked(_) => VotingSystem::Ranked,
        }
    }

    pub fn rank(&self) -> Option<Rank> {
        match self {
            VoteValue::Ranked(rank) => Some(*rank),
            _ => None,
        }
    }
}

/// Coerce a raw value into a vote for `system`.
pub fn coerce(system: VotingSystem, value: &Value) -> Result<VoteValue> {
    match system {
        VotingSystem::Binary => binary::coerce(value).map(VoteValue::Binary),
        VotingSystem::Approval => {
            if approval::is_truthy(value) {
                Ok(VoteValue::Approval)
            } else {
                Err(VoteError::invalid("approval vote must be truthy"))
            }
        }
        VotingSystem::Star => star::coerce(value).map(VoteValue::Star),
        VotingSystem::Ranked => ranked::coerce(value).map(VoteValue::Ranked),
    }
}

/// Whether `value` is a well-formed vote for `system`.
pub fn validate(system: VotingSystem, value: &Value) -> bool {
    coerce(system, value).is_ok()
}

/// Numeric reading of a JSON number or numeric string.
pub(crate) fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
