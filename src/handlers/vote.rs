use log::{info, warn};

use crate::error::{Result, VoteError};
use crate::gateway::{EventsContext, VoteGateway};
use crate::handlers::UiEvent;
use crate::models::{OptionId, Poll, PollOption, UserId, Vote, VotingSystem};
use crate::reconciler::{derive_ranked_option_list, derive_state, RankedOptionList, VoteSource, VoteState};
use crate::session::TemporaryVoteSet;
use crate::voting::{binary, star, VoteValue};

/// Who is voting in this session.
#[derive(Debug, Clone, PartialEq)]
pub enum Voter {
    Authenticated(UserId),
    Anonymous(TemporaryVoteSet),
}

/// Result of handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Valid but changed nothing: a boundary move, a full ranking, a repeat add.
    Unchanged,
    /// Dropped because an earlier submission is still in flight.
    Ignored,
}

/// One voter's view of one poll.
pub struct VotingSession<C> {
    gateway: VoteGateway<C>,
    poll: Poll,
    voter: Voter,
    state: VoteState,
    ranking: RankedOptionList,
}

fn ranking_for(poll: &Poll, source: VoteSource<'_>) -> RankedOptionList {
    if poll.voting_system != VotingSystem::Ranked {
        return RankedOptionList::default();
    }
    let mut ranking = derive_ranked_option_list(&poll.options, source);
    if let Some(cap) = poll.max_rank {
        ranking.truncate(cap as usize);
    }
    ranking
}

impl<C: EventsContext> VotingSession<C> {
    /// Mount for a signed-in voter from their persisted votes.
    pub async fn mount_authenticated(gateway: VoteGateway<C>, poll: Poll, user: UserId) -> Result<Self> {
        let votes = gateway.load_votes(&poll, user).await?;
        let source = VoteSource::Persisted(&votes);
        let state = derive_state(&poll, source);
        let ranking = ranking_for(&poll, source);
        info!("Mounted poll {} for user {} with {} vote(s)", poll.id, user, state.len());
        Ok(Self {
            gateway,
            poll,
            voter: Voter::Authenticated(user),
            state,
            ranking,
        })
    }

    /// Mount for an anonymous visitor from the votes their page session carried.
    pub fn mount_anonymous(gateway: VoteGateway<C>, poll: Poll, carried: Option<TemporaryVoteSet>) -> Self {
        let mut temp = carried
            .filter(|set| set.system() == poll.voting_system)
            .unwrap_or_else(|| TemporaryVoteSet::new(poll.voting_system));
        let source = VoteSource::Temporary(&temp);
        let state = derive_state(&poll, source);
        let ranking = ranking_for(&poll, source);
        // Carried votes may name deleted options, and rankings may exceed the cap.
        if poll.voting_system == VotingSystem::Ranked {
            temp = TemporaryVoteSet::Ranked(ranking.option_ids());
        } else {
            temp.retain(|id| state.get(id).is_some());
        }
        Self {
            gateway,
            poll,
            voter: Voter::Anonymous(temp),
            state,
            ranking,
        }
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    pub fn voter(&self) -> &Voter {
        &self.voter
    }

    pub fn state(&self) -> &VoteState {
        &self.state
    }

    pub fn ranking(&self) -> &RankedOptionList {
        &self.ranking
    }

    pub fn temporary_votes(&self) -> Option<&TemporaryVoteSet> {
        match &self.voter {
            Voter::Anonymous(temp) => Some(temp),
            Voter::Authenticated(_) => None,
        }
    }

    /// Whether the "save your votes" prompt applies.
    pub fn has_unsaved_votes(&self) -> bool {
        self.temporary_votes().is_some_and(TemporaryVoteSet::has_any)
    }

    fn user(&self) -> Option<UserId> {
        match self.voter {
            Voter::Authenticated(user) => Some(user),
            Voter::Anonymous(_) => None,
        }
    }

    fn option(&self, option_id: OptionId) -> Result<PollOption> {
        self.poll
            .option(option_id)
            .cloned()
            .ok_or(VoteError::OptionNotFound(option_id))
    }

    fn require_system(&self, system: VotingSystem) -> Result<()> {
        if self.poll.voting_system == system {
            Ok(())
        } else {
            Err(VoteError::invalid(format!(
                "{} action on {} poll {}",
                system, self.poll.voting_system, self.poll.id
            )))
        }
    }

    pub async fn handle(&mut self, event: UiEvent) -> Result<Outcome> {
        if !self.poll.accepts_votes() {
            return Err(VoteError::PollClosed(self.poll.id));
        }

        match event {
            UiEvent::CastBinaryVote { option_id, value } => {
                self.require_system(VotingSystem::Binary)?;
                let choice = binary::coerce(&value)?;
                let option = self.option(option_id)?;
                let value = match self.user() {
                    Some(user) => self.gateway.submit_binary(&self.poll, &option, user, choice).await?.value,
                    None => VoteValue::Binary(choice),
                };
                self.commit(option_id, Some(value))
            }
            UiEvent::ToggleApprovalVote { option_id } => {
                self.require_system(VotingSystem::Approval)?;
                let option = self.option(option_id)?;
                // Toggle against what the voter currently sees
                let selected = self.state.get(option_id).is_none();
                if let Some(user) = self.user() {
                    self.gateway.submit_approval(&self.poll, &option, user, selected).await?;
                }
                self.commit(option_id, selected.then_some(VoteValue::Approval))
            }
            UiEvent::CastStarVote { option_id, rating } => {
                self.require_system(VotingSystem::Star)?;
                let rating = star::coerce(&rating)?;
                let option = self.option(option_id)?;
                let value = match self.user() {
                    Some(user) => self.gateway.submit_star(&self.poll, &option, user, rating).await?.value,
                    None => VoteValue::Star(rating),
                };
                self.commit(option_id, Some(value))
            }
            UiEvent::ClearStarVote { option_id } => {
                self.require_system(VotingSystem::Star)?;
                let option = self.option(option_id)?;
                if let Some(user) = self.user() {
                    self.gateway.clear_star(&self.poll, &option, user).await?;
                }
                self.commit(option_id, None)
            }
            UiEvent::MoveOptionUp { option_id } => {
                self.edit_ranking(option_id, |ranking, _, _| ranking.move_up(option_id)).await
            }
            UiEvent::MoveOptionDown { option_id } => {
                self.edit_ranking(option_id, |ranking, _, _| ranking.move_down(option_id)).await
            }
            UiEvent::AddToRanking { option_id } => {
                self.edit_ranking(option_id, |ranking, option, max_rank| {
                    ranking.add_to_ranking(option, max_rank)
                })
                .await
            }
            UiEvent::RemoveFromRanking { option_id } => {
                self.edit_ranking(option_id, |ranking, _, _| ranking.remove_from_ranking(option_id))
                    .await
            }
            UiEvent::ClearAllVotes => self.clear_all().await,
        }
    }

    /// Record a confirmed single-option change in the display state and, for
    /// anonymous visitors, in their temporary votes.
    fn commit(&mut self, option_id: OptionId, value: Option<VoteValue>) -> Result<Outcome> {
        if let Voter::Anonymous(temp) = &mut self.voter {
            match value {
                Some(VoteValue::Approval) => {
                    temp.toggle_approval(option_id)?;
                }
                Some(value) => temp.set(option_id, value)?,
                None => {
                    temp.remove(option_id);
                }
            }
        }
        self.state.apply(option_id, value);
        Ok(Outcome::Applied)
    }

    async fn edit_ranking<F>(&mut self, option_id: OptionId, edit: F) -> Result<Outcome>
    where
        F: FnOnce(&mut RankedOptionList, &PollOption, Option<u32>) -> bool,
    {
        self.require_system(VotingSystem::Ranked)?;
        let option = self.option(option_id)?;

        // Edit a copy so a failed submit leaves the ranking untouched
        let mut next = self.ranking.clone();
        if !edit(&mut next, &option, self.poll.max_rank) {
            return Ok(Outcome::Unchanged);
        }

        match &mut self.voter {
            Voter::Authenticated(user) => {
                let user = *user;
                self.gateway.submit_ranked_batch(&self.poll, &next, user).await?;
            }
            Voter::Anonymous(temp) => temp.set_ranking(&next)?,
        }
        self.state = VoteState::from_ranking(&next);
        self.ranking = next;
        Ok(Outcome::Applied)
    }

    async fn clear_all(&mut self) -> Result<Outcome> {
        match &mut self.voter {
            Voter::Authenticated(user) => {
                let user = *user;
                self.gateway.clear_all(&self.poll, user).await?;
            }
            Voter::Anonymous(temp) => temp.clear(),
        }
        self.state = VoteState::new(self.poll.voting_system);
        self.ranking = RankedOptionList::default();
        Ok(Outcome::Applied)
    }

    /// Save an anonymous visitor's votes under the account they just signed
    /// in with, then continue the session as that user.
    ///
    /// On failure the session stays anonymous with its temporary votes intact;
    /// votes already written before the failure remain persisted.
    pub async fn persist_temporary(&mut self, user: UserId) -> Result<Vec<Vote>> {
        let temp = match &self.voter {
            Voter::Anonymous(temp) => temp.clone(),
            Voter::Authenticated(_) => {
                return Err(VoteError::invalid("session is already signed in"));
            }
        };

        // Ranked ballots go in one batch, everything else one vote at a time
        if temp.system() == VotingSystem::Ranked {
            if !self.ranking.is_empty() {
                self.gateway.submit_ranked_batch(&self.poll, &self.ranking, user).await?;
            }
        } else {
            for (option_id, value) in temp.entries() {
                let Some(option) = self.poll.option(option_id) else {
                    warn!("Skipping temporary vote for deleted option {}", option_id);
                    continue;
                };
                match value {
                    VoteValue::Binary(choice) => {
                        self.gateway.submit_binary(&self.poll, option, user, choice).await?;
                    }
                    VoteValue::Approval => {
                        self.gateway.submit_approval(&self.poll, option, user, true).await?;
                    }
                    VoteValue::Star(rating) => {
                        self.gateway.submit_star(&self.poll, option, user, rating).await?;
                    }
                    VoteValue::Ranked(_) => {}
                }
            }
        }

        // Reload from storage and switch the session over
        let votes = self.gateway.load_votes(&self.poll, user).await?;
        let source = VoteSource::Persisted(&votes);
        self.state = derive_state(&self.poll, source);
        self.ranking = ranking_for(&self.poll, source);
        self.voter = Voter::Authenticated(user);
        info!("Saved temporary votes on poll {} for user {}", self.poll.id, user);
        Ok(votes)
    }
}
