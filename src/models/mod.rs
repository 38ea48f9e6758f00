use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::voting::VoteValue;

pub type PollId = i64;
pub type OptionId = i64;
pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub voting_system: VotingSystem,
    /// Upper bound on how many options a voter may rank. Only meaningful for ranked polls.
    pub max_rank: Option<u32>,
    pub phase: PollPhase,
    pub created_by: UserId,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub title: String,
    #[serde(default = "default_rankable")]
    pub rankable: bool,
    pub suggested_by: Option<UserId>,
}

fn default_rankable() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingSystem {
    Binary,
    Approval,
    Ranked,
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    ListBuilding,
    Voting,
    Closed,
}

/// A vote as recorded by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub voter_id: UserId,
    pub value: VoteValue,
    pub cast_at: DateTime<Utc>,
}

/// One `{option_id, rank}` pair of a serialized ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub option_id: OptionId,
    pub rank: u32,
}

impl Poll {
    pub fn new(
        id: PollId,
        title: impl Into<String>,
        voting_system: VotingSystem,
        created_by: UserId,
        options: Vec<PollOption>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            voting_system,
            max_rank: None,
            phase: PollPhase::Voting,
            created_by,
            options,
        }
    }

    pub fn with_max_rank(mut self, max_rank: u32) -> Self {
        self.max_rank = Some(max_rank);
        self
    }

    pub fn option(&self, option_id: OptionId) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    pub fn accepts_votes(&self) -> bool {
        self.phase == PollPhase::Voting
    }
}

impl PollOption {
    pub fn new(id: OptionId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            rankable: true,
            suggested_by: None,
        }
    }
}

impl VotingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotingSystem::Binary => "binary",
            VotingSystem::Approval => "approval",
            VotingSystem::Ranked => "ranked",
            VotingSystem::Star => "star",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "binary" => Some(VotingSystem::Binary),
            "approval" => Some(VotingSystem::Approval),
            "ranked" => Some(VotingSystem::Ranked),
            "star" => Some(VotingSystem::Star),
            _ => None,
        }
    }
}

impl fmt::Display for VotingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PollPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollPhase::ListBuilding => "list_building",
            PollPhase::Voting => "voting",
            PollPhase::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "list_building" => Some(PollPhase::ListBuilding),
            "voting" => Some(PollPhase::Voting),
            "closed" => Some(PollPhase::Closed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voting_system_round_trips_through_its_tag() {
        for system in [
            VotingSystem::Binary,
            VotingSystem::Approval,
            VotingSystem::Ranked,
            VotingSystem::Star,
        ] {
            assert_eq!(VotingSystem::parse(system.as_str()), Some(system));
        }
        assert_eq!(VotingSystem::parse("plurality"), None);
    }

    #[test]
    fn option_lookup_by_id() {
        let poll = Poll::new(
            1,
            "Dinner",
            VotingSystem::Binary,
            9,
            vec![PollOption::new(1, "Pizza"), PollOption::new(2, "Tacos")],
        );
        assert_eq!(poll.option(2).map(|o| o.title.as_str()), Some("Tacos"));
        assert!(poll.option(3).is_none());
        assert!(poll.accepts_votes());
    }

    #[test]
    fn options_default_to_rankable_when_deserialized() {
        let option: PollOption =
            serde_json::from_str(r#"{"id":4,"title":"Jaws","suggested_by":null}"#).unwrap();
        assert!(option.rankable);
    }
}
