use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{Result, VoteAction, VoteError};
use crate::models::{OptionId, Poll, PollOption, RankedEntry, UserId, Vote, VotingSystem};
use crate::reconciler::RankedOptionList;
use crate::voting::{BinaryChoice, StarRating};

/// Errors reported by the Events context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Poll option {0} not found")]
    OptionNotFound(OptionId),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// The persistence and permission layer that owns polls and votes.
#[async_trait]
pub trait EventsContext: Send + Sync {
    async fn cast_binary_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        choice: BinaryChoice,
    ) -> std::result::Result<Vote, ContextError>;

    async fn cast_approval_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
    ) -> std::result::Result<Vote, ContextError>;

    async fn cast_star_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        rating: StarRating,
    ) -> std::result::Result<Vote, ContextError>;

    /// Replace the voter's whole ranking in one transaction.
    async fn cast_ranked_votes(
        &self,
        poll: &Poll,
        voter: UserId,
        ranking: &[RankedEntry],
    ) -> std::result::Result<Vec<Vote>, ContextError>;

    async fn delete_poll_vote(&self, vote: &Vote) -> std::result::Result<(), ContextError>;

    async fn clear_user_poll_votes(&self, poll: &Poll, voter: UserId) -> std::result::Result<u64, ContextError>;

    async fn get_user_poll_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
    ) -> std::result::Result<Option<Vote>, ContextError>;

    async fn list_user_poll_votes(&self, poll: &Poll, voter: UserId) -> std::result::Result<Vec<Vote>, ContextError>;

    async fn list_poll_options_by_ids(
        &self,
        poll: &Poll,
        option_ids: &[OptionId],
    ) -> std::result::Result<Vec<PollOption>, ContextError>;

    async fn create_poll_option(
        &self,
        poll: &Poll,
        title: &str,
        suggested_by: UserId,
    ) -> std::result::Result<PollOption, ContextError>;

    async fn delete_poll_option(
        &self,
        poll: &Poll,
        option_id: OptionId,
        requested_by: UserId,
    ) -> std::result::Result<(), ContextError>;
}

fn to_vote_error(err: ContextError, action: VoteAction) -> VoteError {
    match err {
        ContextError::OptionNotFound(option_id) => VoteError::OptionNotFound(option_id),
        ContextError::Unauthorized(reason) => VoteError::AuthorizationDenied(reason),
        other => VoteError::PersistenceFailure {
            action,
            reason: other.to_string(),
        },
    }
}

/// Turns one voter interaction into exactly one write against the Events context.
/// Nothing is retried; failures go straight back to the caller.
pub struct VoteGateway<C> {
    context: Arc<C>,
}

impl<C> Clone for VoteGateway<C> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<C: EventsContext> VoteGateway<C> {
    pub fn new(context: Arc<C>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    fn ensure_votable(poll: &Poll, system: VotingSystem) -> Result<()> {
        if !poll.accepts_votes() {
            return Err(VoteError::PollClosed(poll.id));
        }
        if poll.voting_system != system {
            return Err(VoteError::invalid(format!(
                "{} vote submitted to {} poll {}",
                system, poll.voting_system, poll.id
            )));
        }
        Ok(())
    }

    pub async fn load_votes(&self, poll: &Poll, voter: UserId) -> Result<Vec<Vote>> {
        self.context
            .list_user_poll_votes(poll, voter)
            .await
            .map_err(|e| to_vote_error(e, VoteAction::Update))
    }

    pub async fn submit_binary(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        choice: BinaryChoice,
    ) -> Result<Vote> {
        Self::ensure_votable(poll, VotingSystem::Binary)?;
        info!("Casting binary vote: poll_id={}, option_id={}, choice={}", poll.id, option.id, choice);
        self.context
            .cast_binary_vote(poll, option, voter, choice)
            .await
            .map_err(|e| {
                error!("Binary vote on poll {} failed: {}", poll.id, e);
                to_vote_error(e, VoteAction::Cast)
            })
    }

    /// Approve or withdraw approval of one option.
    ///
    /// Withdrawing deletes the prior vote if there is one and never writes;
    /// withdrawing an approval that does not exist succeeds with `None`.
    pub async fn submit_approval(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        selected: bool,
    ) -> Result<Option<Vote>> {
        Self::ensure_votable(poll, VotingSystem::Approval)?;
        if selected {
            info!("Casting approval: poll_id={}, option_id={}", poll.id, option.id);
            return self
                .context
                .cast_approval_vote(poll, option, voter)
                .await
                .map(Some)
                .map_err(|e| {
                    error!("Approval on poll {} failed: {}", poll.id, e);
                    to_vote_error(e, VoteAction::Cast)
                });
        }

        info!("Withdrawing approval: poll_id={}, option_id={}", poll.id, option.id);
        self.delete_existing(poll, option, voter).await?;
        Ok(None)
    }

    pub async fn submit_star(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        rating: StarRating,
    ) -> Result<Vote> {
        Self::ensure_votable(poll, VotingSystem::Star)?;
        info!(
            "Casting star vote: poll_id={}, option_id={}, rating={}",
            poll.id,
            option.id,
            rating.get()
        );
        self.context
            .cast_star_vote(poll, option, voter, rating)
            .await
            .map_err(|e| {
                error!("Star vote on poll {} failed: {}", poll.id, e);
                to_vote_error(e, VoteAction::Cast)
            })
    }

    /// Remove a star rating. Clearing an unrated option succeeds.
    pub async fn clear_star(&self, poll: &Poll, option: &PollOption, voter: UserId) -> Result<()> {
        Self::ensure_votable(poll, VotingSystem::Star)?;
        info!("Clearing star vote: poll_id={}, option_id={}", poll.id, option.id);
        self.delete_existing(poll, option, voter).await
    }

    async fn delete_existing(&self, poll: &Poll, option: &PollOption, voter: UserId) -> Result<()> {
        let existing = self
            .context
            .get_user_poll_vote(poll, option, voter)
            .await
            .map_err(|e| to_vote_error(e, VoteAction::Clear))?;
        match existing {
            Some(vote) => self.context.delete_poll_vote(&vote).await.map_err(|e| {
                error!("Deleting vote {} on poll {} failed: {}", vote.id, poll.id, e);
                to_vote_error(e, VoteAction::Clear)
            }),
            None => Ok(()),
        }
    }

    /// Persist the voter's entire ranking as one batch.
    ///
    /// The batch is rejected when it is longer than the poll's `max_rank`,
    /// names an option twice, or names an option the poll no longer has.
    pub async fn submit_ranked_batch(
        &self,
        poll: &Poll,
        ranked_options: &RankedOptionList,
        voter: UserId,
    ) -> Result<Vec<Vote>> {
        Self::ensure_votable(poll, VotingSystem::Ranked)?;

        if let Some(cap) = poll.max_rank {
            if ranked_options.len() > cap as usize {
                warn!(
                    "Rejecting ranking of {} options on poll {} (max_rank={})",
                    ranked_options.len(),
                    poll.id,
                    cap
                );
                return Err(VoteError::invalid(format!(
                    "ranking has {} options, at most {} allowed",
                    ranked_options.len(),
                    cap
                )));
            }
        }

        // Check for duplicates
        let option_ids = ranked_options.option_ids();
        let mut seen = HashSet::new();
        if let Some(duplicate) = option_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(VoteError::invalid(format!("option {} ranked twice", duplicate)));
        }

        // Every ranked option must still exist
        let resolved = self
            .context
            .list_poll_options_by_ids(poll, &option_ids)
            .await
            .map_err(|e| to_vote_error(e, VoteAction::Update))?;
        if let Some(missing) = option_ids
            .iter()
            .find(|id| !resolved.iter().any(|o| o.id == **id))
        {
            return Err(VoteError::OptionNotFound(*missing));
        }

        let entries = ranked_options.to_rank_entries();
        info!(
            "Casting ranked ballot: poll_id={}, ranked_options={}",
            poll.id,
            entries.len()
        );
        self.context
            .cast_ranked_votes(poll, voter, &entries)
            .await
            .map_err(|e| {
                error!("Ranked ballot on poll {} failed: {}", poll.id, e);
                to_vote_error(e, VoteAction::Update)
            })
    }

    pub async fn clear_all(&self, poll: &Poll, voter: UserId) -> Result<()> {
        if !poll.accepts_votes() {
            return Err(VoteError::PollClosed(poll.id));
        }
        let removed = self
            .context
            .clear_user_poll_votes(poll, voter)
            .await
            .map_err(|e| {
                error!("Clearing votes on poll {} failed: {}", poll.id, e);
                to_vote_error(e, VoteAction::Clear)
            })?;
        info!("Cleared {} vote(s) on poll {} for user {}", removed, poll.id, voter);
        Ok(())
    }

    /// Suggest a new option while the poll is collecting them.
    pub async fn suggest_option(&self, poll: &Poll, title: &str, suggested_by: UserId) -> Result<PollOption> {
        let title = title.trim();
        if title.is_empty() {
            return Err(VoteError::invalid("option title is empty"));
        }
        if poll.phase == crate::models::PollPhase::Closed {
            return Err(VoteError::PollClosed(poll.id));
        }
        self.context
            .create_poll_option(poll, title, suggested_by)
            .await
            .map_err(|e| to_vote_error(e, VoteAction::Update))
    }

    /// Delete a suggested option. Whether `requested_by` may do so is the
    /// Events context's decision; a refusal comes back as `AuthorizationDenied`.
    pub async fn delete_option(&self, poll: &Poll, option_id: OptionId, requested_by: UserId) -> Result<()> {
        self.context
            .delete_poll_option(poll, option_id, requested_by)
            .await
            .map_err(|e| {
                warn!("Deleting option {} on poll {} refused: {}", option_id, poll.id, e);
                to_vote_error(e, VoteAction::Update)
            })
    }
}
