use log::debug;
use std::collections::{BTreeMap, HashSet};

use crate::models::{OptionId, Poll, PollOption, RankedEntry, Vote, VotingSystem};
use crate::session::TemporaryVoteSet;
use crate::voting::{Rank, VoteValue};

/// Where a voter's votes come from on mount.
#[derive(Debug, Clone, Copy)]
pub enum VoteSource<'a> {
    Persisted(&'a [Vote]),
    Temporary(&'a TemporaryVoteSet),
}

impl VoteSource<'_> {
    fn entries(&self) -> Vec<(OptionId, VoteValue)> {
        match self {
            VoteSource::Persisted(votes) => votes.iter().map(|v| (v.option_id, v.value)).collect(),
            VoteSource::Temporary(set) => set.entries(),
        }
    }
}

/// Per-option display state for one voter on one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteState {
    system: VotingSystem,
    votes: BTreeMap<OptionId, VoteValue>,
}

impl VoteState {
    pub fn new(system: VotingSystem) -> Self {
        Self {
            system,
            votes: BTreeMap::new(),
        }
    }

    /// Ranked state of an on-screen list; ranks are index + 1.
    pub fn from_ranking(list: &RankedOptionList) -> Self {
        let votes = list
            .options()
            .iter()
            .enumerate()
            .map(|(index, option)| (option.id, VoteValue::Ranked(Rank::from_index(index))))
            .collect();
        Self {
            system: VotingSystem::Ranked,
            votes,
        }
    }

    pub fn system(&self) -> VotingSystem {
        self.system
    }

    pub fn get(&self, option_id: OptionId) -> Option<&VoteValue> {
        self.votes.get(&option_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionId, &VoteValue)> {
        self.votes.iter().map(|(id, value)| (*id, value))
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Ranked entries ordered by rank. Empty for other systems.
    pub fn by_rank(&self) -> Vec<(Rank, OptionId)> {
        let mut ranked: Vec<_> = self
            .votes
            .iter()
            .filter_map(|(id, value)| value.rank().map(|rank| (rank, *id)))
            .collect();
        ranked.sort();
        ranked
    }

    /// Apply a confirmed change for a single option. `None` removes the vote.
    pub(crate) fn apply(&mut self, option_id: OptionId, value: Option<VoteValue>) {
        match value {
            Some(value) => {
                self.votes.insert(option_id, value);
            }
            None => {
                self.votes.remove(&option_id);
            }
        }
    }
}

/// Compute the display state of `poll` from `source`.
///
/// Votes for options the poll no longer has, and votes of another voting
/// system, are dropped. Ranked votes are renumbered from 1 and capped at the
/// poll's `max_rank`.
pub fn derive_state(poll: &Poll, source: VoteSource<'_>) -> VoteState {
    if poll.voting_system == VotingSystem::Ranked {
        let mut list = derive_ranked_option_list(&poll.options, source);
        if let Some(cap) = poll.max_rank {
            list.truncate(cap as usize);
        }
        return VoteState::from_ranking(&list);
    }

    let mut state = VoteState::new(poll.voting_system);
    for (option_id, value) in source.entries() {
        if value.system() != poll.voting_system {
            debug!("Ignoring {} vote on {} poll {}", value.system(), poll.voting_system, poll.id);
            continue;
        }
        if poll.option(option_id).is_none() {
            debug!("Dropping vote for missing option {} on poll {}", option_id, poll.id);
            continue;
        }
        let value = match poll.voting_system {
            VotingSystem::Approval => VoteValue::Approval,
            VotingSystem::Binary | VotingSystem::Star | VotingSystem::Ranked => value,
        };
        state.votes.insert(option_id, value);
    }
    state
}

/// Resolve the ranked entries of `source` to options, in rank order.
///
/// Entries whose option has been deleted are skipped. Ties on rank are broken
/// by option id, and an option ranked twice keeps its best rank.
pub fn derive_ranked_option_list(options: &[PollOption], source: VoteSource<'_>) -> RankedOptionList {
    let mut ranked: Vec<(Rank, OptionId)> = source
        .entries()
        .into_iter()
        .filter_map(|(option_id, value)| value.rank().map(|rank| (rank, option_id)))
        .collect();
    ranked.sort();

    // Keep each option's best rank, skipping deleted options
    let mut seen = HashSet::new();
    let resolved = ranked
        .into_iter()
        .filter(|(_, option_id)| seen.insert(*option_id))
        .filter_map(|(_, option_id)| options.iter().find(|o| o.id == option_id).cloned())
        .collect();
    RankedOptionList { options: resolved }
}

/// A voter's ranking as shown on screen, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedOptionList {
    options: Vec<PollOption>,
}

impl RankedOptionList {
    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn contains(&self, option_id: OptionId) -> bool {
        self.position(option_id).is_some()
    }

    fn position(&self, option_id: OptionId) -> Option<usize> {
        self.options.iter().position(|o| o.id == option_id)
    }

    /// Swap with the option above. Returns whether anything moved.
    pub fn move_up(&mut self, option_id: OptionId) -> bool {
        match self.position(option_id) {
            Some(index) if index > 0 => {
                self.options.swap(index, index - 1);
                true
            }
            _ => false,
        }
    }

    /// Swap with the option below. Returns whether anything moved.
    pub fn move_down(&mut self, option_id: OptionId) -> bool {
        match self.position(option_id) {
            Some(index) if index + 1 < self.options.len() => {
                self.options.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    /// Append `option` at the next rank.
    ///
    /// No-op when it is already ranked, not rank-eligible, or the list has
    /// reached `max_rank`.
    pub fn add_to_ranking(&mut self, option: &PollOption, max_rank: Option<u32>) -> bool {
        if !option.rankable || self.contains(option.id) || self.is_full(max_rank) {
            return false;
        }
        self.options.push(option.clone());
        true
    }

    pub fn remove_from_ranking(&mut self, option_id: OptionId) -> bool {
        match self.position(option_id) {
            Some(index) => {
                self.options.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_full(&self, max_rank: Option<u32>) -> bool {
        max_rank.is_some_and(|cap| self.options.len() >= cap as usize)
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.options.truncate(len);
    }

    /// `{option_id, rank}` pairs with rank = index + 1.
    pub fn to_rank_entries(&self) -> Vec<RankedEntry> {
        self.options
            .iter()
            .enumerate()
            .map(|(index, option)| RankedEntry {
                option_id: option.id,
                rank: Rank::from_index(index).get(),
            })
            .collect()
    }

    pub fn option_ids(&self) -> Vec<OptionId> {
        self.options.iter().map(|o| o.id).collect()
    }
}

impl From<Vec<PollOption>> for RankedOptionList {
    fn from(options: Vec<PollOption>) -> Self {
        let mut seen = HashSet::new();
        let options = options.into_iter().filter(|o| seen.insert(o.id)).collect();
        Self { options }
    }
}
