use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::Path;
use uuid::Uuid;

use crate::error::{Result, VoteError};
use crate::models::{OptionId, Poll, PollId, RankedEntry, VotingSystem};
use crate::reconciler::RankedOptionList;
use crate::voting::{BinaryChoice, Rank, StarRating, VoteValue};

/// An anonymous visitor's votes on one poll, shaped like the persisted votes
/// a signed-in voter would have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "system", content = "votes", rename_all = "snake_case")]
pub enum TemporaryVoteSet {
    Binary(BTreeMap<OptionId, BinaryChoice>),
    Approval(BTreeSet<OptionId>),
    Star(BTreeMap<OptionId, StarRating>),
    /// Option ids in rank order; rank is index + 1.
    Ranked(Vec<OptionId>),
}

impl TemporaryVoteSet {
    pub fn new(system: VotingSystem) -> Self {
        match system {
            VotingSystem::Binary => TemporaryVoteSet::Binary(BTreeMap::new()),
            VotingSystem::Approval => TemporaryVoteSet::Approval(BTreeSet::new()),
            VotingSystem::Star => TemporaryVoteSet::Star(BTreeMap::new()),
            VotingSystem::Ranked => TemporaryVoteSet::Ranked(Vec::new()),
        }
    }

    pub fn system(&self) -> VotingSystem {
        match self {
            TemporaryVoteSet::Binary(_) => VotingSystem::Binary,
            TemporaryVoteSet::Approval(_) => VotingSystem::Approval,
            TemporaryVoteSet::Star(_) => VotingSystem::Star,
            TemporaryVoteSet::Ranked(_) => VotingSystem::Ranked,
        }
    }

    /// Record a vote for one option.
    ///
    /// Binary and star votes overwrite; an approval toggles the option in or
    /// out. Rankings are edited through [`RankedOptionList`] and stored with
    /// [`TemporaryVoteSet::set_ranking`] instead.
    pub fn set(&mut self, option_id: OptionId, value: VoteValue) -> Result<()> {
        match (self, value) {
            (TemporaryVoteSet::Binary(votes), VoteValue::Binary(choice)) => {
                votes.insert(option_id, choice);
            }
            (TemporaryVoteSet::Star(votes), VoteValue::Star(rating)) => {
                votes.insert(option_id, rating);
            }
            (TemporaryVoteSet::Approval(selected), VoteValue::Approval) => {
                if !selected.remove(&option_id) {
                    selected.insert(option_id);
                }
            }
            (TemporaryVoteSet::Ranked(_), _) => {
                return Err(VoteError::invalid(
                    "ranked votes are set through the ranking list",
                ));
            }
            (set, value) => {
                return Err(VoteError::invalid(format!(
                    "{} vote given to a {} poll",
                    value.system(),
                    set.system()
                )));
            }
        }
        Ok(())
    }

    /// Toggle an approval, returning whether the option is now selected.
    pub fn toggle_approval(&mut self, option_id: OptionId) -> Result<bool> {
        self.set(option_id, VoteValue::Approval)?;
        Ok(self.get(option_id).is_some())
    }

    /// Drop the vote for one option. Returns whether anything was removed.
    pub fn remove(&mut self, option_id: OptionId) -> bool {
        match self {
            TemporaryVoteSet::Binary(votes) => votes.remove(&option_id).is_some(),
            TemporaryVoteSet::Star(votes) => votes.remove(&option_id).is_some(),
            TemporaryVoteSet::Approval(selected) => selected.remove(&option_id),
            TemporaryVoteSet::Ranked(order) => {
                let before = order.len();
                order.retain(|id| *id != option_id);
                order.len() != before
            }
        }
    }

    pub fn clear(&mut self) {
        *self = TemporaryVoteSet::new(self.system());
    }

    /// Drop every vote whose option fails `keep`; ranked order is preserved.
    pub fn retain(&mut self, keep: impl Fn(OptionId) -> bool) {
        match self {
            TemporaryVoteSet::Binary(votes) => votes.retain(|id, _| keep(*id)),
            TemporaryVoteSet::Star(votes) => votes.retain(|id, _| keep(*id)),
            TemporaryVoteSet::Approval(selected) => selected.retain(|id| keep(*id)),
            TemporaryVoteSet::Ranked(order) => order.retain(|id| keep(*id)),
        }
    }

    pub fn has_any(&self) -> bool {
        match self {
            TemporaryVoteSet::Binary(votes) => !votes.is_empty(),
            TemporaryVoteSet::Star(votes) => !votes.is_empty(),
            TemporaryVoteSet::Approval(selected) => !selected.is_empty(),
            TemporaryVoteSet::Ranked(order) => !order.is_empty(),
        }
    }

    pub fn get(&self, option_id: OptionId) -> Option<VoteValue> {
        match self {
            TemporaryVoteSet::Binary(votes) => votes.get(&option_id).map(|c| VoteValue::Binary(*c)),
            TemporaryVoteSet::Star(votes) => votes.get(&option_id).map(|r| VoteValue::Star(*r)),
            TemporaryVoteSet::Approval(selected) => {
                selected.contains(&option_id).then_some(VoteValue::Approval)
            }
            TemporaryVoteSet::Ranked(order) => order
                .iter()
                .position(|id| *id == option_id)
                .map(|index| VoteValue::Ranked(Rank::from_index(index))),
        }
    }

    /// Every vote in the set; ranked entries come out in rank order.
    pub fn entries(&self) -> Vec<(OptionId, VoteValue)> {
        match self {
            TemporaryVoteSet::Binary(votes) => {
                votes.iter().map(|(id, c)| (*id, VoteValue::Binary(*c))).collect()
            }
            TemporaryVoteSet::Star(votes) => {
                votes.iter().map(|(id, r)| (*id, VoteValue::Star(*r))).collect()
            }
            TemporaryVoteSet::Approval(selected) => {
                selected.iter().map(|id| (*id, VoteValue::Approval)).collect()
            }
            TemporaryVoteSet::Ranked(order) => order
                .iter()
                .enumerate()
                .map(|(index, id)| (*id, VoteValue::Ranked(Rank::from_index(index))))
                .collect(),
        }
    }

    pub fn ranking(&self) -> &[OptionId] {
        match self {
            TemporaryVoteSet::Ranked(order) => order,
            _ => &[],
        }
    }

    /// `{option_id, rank}` pairs derived from the stored order.
    pub fn ranked_entries(&self) -> Vec<RankedEntry> {
        self.ranking()
            .iter()
            .enumerate()
            .map(|(index, option_id)| RankedEntry {
                option_id: *option_id,
                rank: Rank::from_index(index).get(),
            })
            .collect()
    }

    /// Store the on-screen ranking after a structural edit.
    pub fn set_ranking(&mut self, list: &RankedOptionList) -> Result<()> {
        match self {
            TemporaryVoteSet::Ranked(order) => {
                *order = list.option_ids();
                Ok(())
            }
            other => Err(VoteError::invalid(format!(
                "cannot store a ranking in a {} vote set",
                other.system()
            ))),
        }
    }

    /// Fold `other` into this set. Values from `other` win for options present
    /// in both; rankings keep this set's order and append unseen options up to
    /// `max_rank`.
    pub fn merge(&mut self, other: TemporaryVoteSet, max_rank: Option<u32>) -> Result<()> {
        match (self, other) {
            (TemporaryVoteSet::Binary(votes), TemporaryVoteSet::Binary(incoming)) => {
                votes.extend(incoming);
            }
            (TemporaryVoteSet::Star(votes), TemporaryVoteSet::Star(incoming)) => {
                votes.extend(incoming);
            }
            (TemporaryVoteSet::Approval(selected), TemporaryVoteSet::Approval(incoming)) => {
                selected.extend(incoming);
            }
            (TemporaryVoteSet::Ranked(order), TemporaryVoteSet::Ranked(incoming)) => {
                for option_id in incoming {
                    if max_rank.is_some_and(|cap| order.len() >= cap as usize) {
                        break;
                    }
                    if !order.contains(&option_id) {
                        order.push(option_id);
                    }
                }
            }
            (set, other) => {
                return Err(VoteError::invalid(format!(
                    "cannot merge {} votes into a {} vote set",
                    other.system(),
                    set.system()
                )));
            }
        }
        Ok(())
    }
}

/// The page-session bag of temporary votes, keyed by poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionVotes {
    pub session_id: Uuid,
    polls: HashMap<PollId, TemporaryVoteSet>,
}

impl Default for SessionVotes {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionVotes {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            polls: HashMap::new(),
        }
    }

    pub fn get(&self, poll_id: PollId) -> Option<&TemporaryVoteSet> {
        self.polls.get(&poll_id)
    }

    /// The set for `poll`, created on first interaction. A carried set whose
    /// system no longer matches the poll is replaced.
    pub fn get_or_create(&mut self, poll: &Poll) -> &mut TemporaryVoteSet {
        let set = self
            .polls
            .entry(poll.id)
            .or_insert_with(|| TemporaryVoteSet::new(poll.voting_system));
        if set.system() != poll.voting_system {
            debug!(
                "Session {} dropping stale {} votes for poll {}",
                self.session_id,
                set.system(),
                poll.id
            );
            *set = TemporaryVoteSet::new(poll.voting_system);
        }
        set
    }

    pub fn put(&mut self, poll_id: PollId, set: TemporaryVoteSet) {
        self.polls.insert(poll_id, set);
    }

    pub fn discard(&mut self, poll_id: PollId) -> Option<TemporaryVoteSet> {
        self.polls.remove(&poll_id)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| VoteError::invalid(format!("unserializable session votes: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VoteError::invalid(format!("malformed session votes: {}", e)))
    }

    /// Read a bag written by [`SessionVotes::save`]. A missing file is a fresh session.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No session votes at {}", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(VoteError::invalid(format!(
                "unreadable session votes {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_json()?).await.map_err(|e| {
            VoteError::invalid(format!("unwritable session votes {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PollOption;

    fn star(n: i64) -> VoteValue {
        VoteValue::Star(StarRating::new(n).unwrap())
    }

    #[test]
    fn binary_and_star_votes_overwrite() {
        let mut set = TemporaryVoteSet::new(VotingSystem::Binary);
        set.set(1, VoteValue::Binary(BinaryChoice::Yes)).unwrap();
        set.set(1, VoteValue::Binary(BinaryChoice::No)).unwrap();
        assert_eq!(set.entries(), vec![(1, VoteValue::Binary(BinaryChoice::No))]);

        let mut set = TemporaryVoteSet::new(VotingSystem::Star);
        set.set(2, star(3)).unwrap();
        set.set(2, star(5)).unwrap();
        assert_eq!(set.get(2), Some(star(5)));
    }

    #[test]
    fn approval_toggle_twice_returns_to_empty() {
        let mut set = TemporaryVoteSet::new(VotingSystem::Approval);
        assert!(set.toggle_approval(7).unwrap());
        assert!(set.has_any());
        assert!(!set.toggle_approval(7).unwrap());
        assert_eq!(set, TemporaryVoteSet::new(VotingSystem::Approval));
        assert!(!set.has_any());
    }

    #[test]
    fn ranked_sets_reject_direct_writes() {
        let mut set = TemporaryVoteSet::new(VotingSystem::Ranked);
        let rank = VoteValue::Ranked(Rank::new(1).unwrap());
        assert!(matches!(set.set(1, rank), Err(VoteError::InvalidInput(_))));
    }

    #[test]
    fn mismatched_systems_are_invalid() {
        let mut set = TemporaryVoteSet::new(VotingSystem::Star);
        let result = set.set(1, VoteValue::Binary(BinaryChoice::Yes));
        assert!(matches!(result, Err(VoteError::InvalidInput(_))));
        assert!(!set.has_any());
    }

    #[test]
    fn ranking_round_trips_through_the_list() {
        let options = vec![PollOption::new(1, "A"), PollOption::new(2, "B")];
        let mut list = RankedOptionList::default();
        list.add_to_ranking(&options[1], None);
        list.add_to_ranking(&options[0], None);

        let mut set = TemporaryVoteSet::new(VotingSystem::Ranked);
        set.set_ranking(&list).unwrap();
        assert_eq!(set.ranking(), &[2, 1]);
        assert_eq!(
            set.ranked_entries(),
            vec![
                RankedEntry { option_id: 2, rank: 1 },
                RankedEntry { option_id: 1, rank: 2 },
            ]
        );
        assert_eq!(set.get(1), Some(VoteValue::Ranked(Rank::new(2).unwrap())));
    }

    #[test]
    fn clear_keeps_the_system() {
        let mut set = TemporaryVoteSet::Ranked(vec![3, 1]);
        set.clear();
        assert_eq!(set, TemporaryVoteSet::Ranked(Vec::new()));
        assert!(!set.has_any());
    }

    #[test]
    fn merge_respects_cap_and_existing_order() {
        let mut set = TemporaryVoteSet::Ranked(vec![4]);
        set.merge(TemporaryVoteSet::Ranked(vec![2, 4, 9]), Some(2)).unwrap();
        assert_eq!(set.ranking(), &[4, 2]);

        let mut set = TemporaryVoteSet::Approval(BTreeSet::from([1]));
        set.merge(TemporaryVoteSet::Approval(BTreeSet::from([2])), None).unwrap();
        assert_eq!(set.entries().len(), 2);

        let err = set.merge(TemporaryVoteSet::new(VotingSystem::Star), None);
        assert!(matches!(err, Err(VoteError::InvalidInput(_))));
    }

    #[test]
    fn session_bag_carries_sets_through_json() {
        let poll = Poll::new(5, "Movie night", VotingSystem::Star, 1, vec![PollOption::new(1, "Alien")]);
        let mut session = SessionVotes::new();
        session.get_or_create(&poll).set(1, star(4)).unwrap();

        let restored = SessionVotes::from_json(&session.to_json().unwrap()).unwrap();
        assert_eq!(restored, session);
        assert_eq!(restored.get(5).and_then(|set| set.get(1)), Some(star(4)));
    }

    #[test]
    fn stale_sets_are_replaced_when_the_system_changes() {
        let mut poll = Poll::new(5, "Movie night", VotingSystem::Star, 1, Vec::new());
        let mut session = SessionVotes::new();
        session.get_or_create(&poll).set(1, star(2)).unwrap();

        poll.voting_system = VotingSystem::Approval;
        let set = session.get_or_create(&poll);
        assert_eq!(set.system(), VotingSystem::Approval);
        assert!(!set.has_any());
    }

    #[test]
    fn retain_keeps_rank_order() {
        let mut set = TemporaryVoteSet::Ranked(vec![3, 9, 1]);
        set.retain(|id| id != 9);
        assert_eq!(set.ranking(), &[3, 1]);

        let mut stars = TemporaryVoteSet::new(VotingSystem::Star);
        stars.set(9, star(3)).unwrap();
        stars.retain(|id| id != 9);
        assert!(!stars.has_any());
    }

    #[tokio::test]
    async fn carried_votes_survive_a_save_and_load() {
        let path = std::env::temp_dir().join(format!("session-votes-{}.json", Uuid::new_v4()));
        let poll = Poll::new(5, "Movie night", VotingSystem::Star, 1, vec![PollOption::new(1, "Alien")]);

        let fresh = SessionVotes::load(&path).await.unwrap();
        assert!(fresh.get(5).is_none());

        let mut session = SessionVotes::new();
        session.get_or_create(&poll).set(1, star(4)).unwrap();
        session.save(&path).await.unwrap();

        let mut restored = SessionVotes::load(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(restored.session_id, session.session_id);
        assert_eq!(restored.discard(5).and_then(|set| set.get(1)), Some(star(4)));
    }

    #[test]
    fn malformed_session_json_is_invalid_input() {
        assert!(matches!(
            SessionVotes::from_json("{not json"),
            Err(VoteError::InvalidInput(_))
        ));
    }
}
