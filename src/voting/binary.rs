use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, VoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryChoice {
    Yes,
    Maybe,
    No,
}

impl BinaryChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryChoice::Yes => "yes",
            BinaryChoice::Maybe => "maybe",
            BinaryChoice::No => "no",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        // Only the exact literals are accepted; no trimming or case folding.
        match value {
            "yes" => Some(BinaryChoice::Yes),
            "maybe" => Some(BinaryChoice::Maybe),
            "no" => Some(BinaryChoice::No),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn coerce(value: &Value) -> Result<BinaryChoice> {
    value
        .as_str()
        .and_then(BinaryChoice::parse)
        .ok_or_else(|| VoteError::invalid(format!("binary vote must be yes, maybe or no, got {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_only_the_three_literals() {
        assert_eq!(coerce(&json!("yes")).unwrap(), BinaryChoice::Yes);
        assert_eq!(coerce(&json!("maybe")).unwrap(), BinaryChoice::Maybe);
        assert_eq!(coerce(&json!("no")).unwrap(), BinaryChoice::No);

        for bad in [json!("YES"), json!(" yes"), json!(true), json!(1), json!(null)] {
            assert!(matches!(coerce(&bad), Err(VoteError::InvalidInput(_))), "{bad}");
        }
    }
}
