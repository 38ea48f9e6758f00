mod shared;
mod vote;

pub use shared::SharedSession;
pub use vote::{Outcome, Voter, VotingSession};

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde_json::Value;

use crate::error::{Result, VoteError};
use crate::models::OptionId;

lazy_static! {
    // <action>_<option_id>[_<value>]
    static ref COMPONENT_ID: Regex = Regex::new(
        r"^(?P<action>binary|approval|star_clear|star|rank_up|rank_down|rank_add|rank_remove)_(?P<option>[^_]+)(?:_(?P<value>.+))?$"
    )
    .expect("component id pattern is valid");
}

/// A voter interaction, as delivered by the page.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    CastBinaryVote { option_id: OptionId, value: Value },
    ToggleApprovalVote { option_id: OptionId },
    CastStarVote { option_id: OptionId, rating: Value },
    ClearStarVote { option_id: OptionId },
    MoveOptionUp { option_id: OptionId },
    MoveOptionDown { option_id: OptionId },
    AddToRanking { option_id: OptionId },
    RemoveFromRanking { option_id: OptionId },
    ClearAllVotes,
}

impl UiEvent {
    /// Parse a component id such as `star_12_4` or `rank_up_12`.
    pub fn parse(component_id: &str) -> Result<Self> {
        let component_id = component_id.trim();
        if component_id == "clear_all" {
            return Ok(UiEvent::ClearAllVotes);
        }

        let caps = COMPONENT_ID.captures(component_id).ok_or_else(|| {
            warn!("Unhandled component id: {}", component_id);
            VoteError::invalid(format!("unknown action {:?}", component_id))
        })?;

        let option = &caps["option"];
        let option_id: OptionId = option
            .parse()
            .map_err(|_| VoteError::invalid(format!("malformed option id {:?}", option)))?;
        let value = caps.name("value").map(|m| Value::String(m.as_str().to_string()));

        let event = match (&caps["action"], value) {
            ("binary", Some(value)) => UiEvent::CastBinaryVote { option_id, value },
            ("star", Some(rating)) => UiEvent::CastStarVote { option_id, rating },
            ("approval", None) => UiEvent::ToggleApprovalVote { option_id },
            ("star_clear", None) => UiEvent::ClearStarVote { option_id },
            ("rank_up", None) => UiEvent::MoveOptionUp { option_id },
            ("rank_down", None) => UiEvent::MoveOptionDown { option_id },
            ("rank_add", None) => UiEvent::AddToRanking { option_id },
            ("rank_remove", None) => UiEvent::RemoveFromRanking { option_id },
            (action, _) => {
                return Err(VoteError::invalid(format!(
                    "malformed {} action {:?}",
                    action, component_id
                )));
            }
        };
        Ok(event)
    }

    pub fn option_id(&self) -> Option<OptionId> {
        match self {
            UiEvent::CastBinaryVote { option_id, .. }
            | UiEvent::ToggleApprovalVote { option_id }
            | UiEvent::CastStarVote { option_id, .. }
            | UiEvent::ClearStarVote { option_id }
            | UiEvent::MoveOptionUp { option_id }
            | UiEvent::MoveOptionDown { option_id }
            | UiEvent::AddToRanking { option_id }
            | UiEvent::RemoveFromRanking { option_id } => Some(*option_id),
            UiEvent::ClearAllVotes => None,
        }
    }
}
