#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use poll_votes::voting::{BinaryChoice, Rank, StarRating};
use poll_votes::{
    ContextError, EventsContext, OptionId, Poll, PollOption, RankedEntry, UserId, Vote, VoteGateway,
    VoteValue, VotingSystem,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn poll(system: VotingSystem, titles: &[&str]) -> Poll {
    let options = titles
        .iter()
        .enumerate()
        .map(|(i, title)| PollOption::new(i as i64 + 1, *title))
        .collect();
    Poll::new(1, "Friday plans", system, 100, options)
}

#[derive(Default)]
struct Store {
    votes: Vec<Vote>,
    next_id: i64,
    calls: Vec<&'static str>,
    deleted_options: HashSet<OptionId>,
}

/// In-memory Events context that records every call it receives.
#[derive(Default)]
pub struct RecordingEvents {
    store: Mutex<Store>,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    pub write_started: Notify,
    pub release_write: Notify,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gateway(self: &Arc<Self>) -> VoteGateway<RecordingEvents> {
        VoteGateway::new(Arc::clone(self))
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.store.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn votes_of(&self, voter: UserId) -> Vec<Vote> {
        self.store
            .lock()
            .unwrap()
            .votes
            .iter()
            .filter(|v| v.voter_id == voter)
            .cloned()
            .collect()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes wait for `release_write` after signalling `write_started`.
    pub fn hold_writes(&self, hold: bool) {
        self.hold_writes.store(hold, Ordering::SeqCst);
    }

    pub fn delete_option(&self, option_id: OptionId) {
        self.store.lock().unwrap().deleted_options.insert(option_id);
    }

    pub fn seed(&self, poll: &Poll, voter: UserId, option_id: OptionId, value: VoteValue) {
        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let vote = Vote {
            id: store.next_id,
            poll_id: poll.id,
            option_id,
            voter_id: voter,
            value,
            cast_at: Utc::now(),
        };
        store.votes.push(vote);
    }

    fn record(&self, call: &'static str) {
        self.store.lock().unwrap().calls.push(call);
    }

    async fn write(&self, call: &'static str) -> Result<(), ContextError> {
        self.record(call);
        if self.hold_writes.load(Ordering::SeqCst) {
            self.write_started.notify_one();
            self.release_write.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ContextError::Failed("connection reset".to_string()));
        }
        Ok(())
    }

    fn upsert(&self, poll: &Poll, option_id: OptionId, voter: UserId, value: VoteValue) -> Result<Vote, ContextError> {
        let mut store = self.store.lock().unwrap();
        if store.deleted_options.contains(&option_id) || poll.option(option_id).is_none() {
            return Err(ContextError::OptionNotFound(option_id));
        }
        store.votes.retain(|v| !(v.option_id == option_id && v.voter_id == voter));
        store.next_id += 1;
        let vote = Vote {
            id: store.next_id,
            poll_id: poll.id,
            option_id,
            voter_id: voter,
            value,
            cast_at: Utc::now(),
        };
        store.votes.push(vote.clone());
        Ok(vote)
    }
}

#[async_trait]
impl EventsContext for RecordingEvents {
    async fn cast_binary_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        choice: BinaryChoice,
    ) -> Result<Vote, ContextError> {
        self.write("cast_binary_vote").await?;
        self.upsert(poll, option.id, voter, VoteValue::Binary(choice))
    }

    async fn cast_approval_vote(&self, poll: &Poll, option: &PollOption, voter: UserId) -> Result<Vote, ContextError> {
        self.write("cast_approval_vote").await?;
        self.upsert(poll, option.id, voter, VoteValue::Approval)
    }

    async fn cast_star_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        rating: StarRating,
    ) -> Result<Vote, ContextError> {
        self.write("cast_star_vote").await?;
        self.upsert(poll, option.id, voter, VoteValue::Star(rating))
    }

    async fn cast_ranked_votes(
        &self,
        poll: &Poll,
        voter: UserId,
        ranking: &[RankedEntry],
    ) -> Result<Vec<Vote>, ContextError> {
        self.write("cast_ranked_votes").await?;
        self.store
            .lock()
            .unwrap()
            .votes
            .retain(|v| !(v.poll_id == poll.id && v.voter_id == voter));
        ranking
            .iter()
            .map(|entry| {
                let rank = Rank::new(i64::from(entry.rank)).ok_or_else(|| ContextError::Failed("bad rank".into()))?;
                self.upsert(poll, entry.option_id, voter, VoteValue::Ranked(rank))
            })
            .collect()
    }

    async fn delete_poll_vote(&self, vote: &Vote) -> Result<(), ContextError> {
        self.write("delete_poll_vote").await?;
        self.store.lock().unwrap().votes.retain(|v| v.id != vote.id);
        Ok(())
    }

    async fn clear_user_poll_votes(&self, poll: &Poll, voter: UserId) -> Result<u64, ContextError> {
        self.write("clear_user_poll_votes").await?;
        let mut store = self.store.lock().unwrap();
        let before = store.votes.len();
        store.votes.retain(|v| !(v.poll_id == poll.id && v.voter_id == voter));
        Ok((before - store.votes.len()) as u64)
    }

    async fn get_user_poll_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
    ) -> Result<Option<Vote>, ContextError> {
        self.record("get_user_poll_vote");
        Ok(self
            .store
            .lock()
            .unwrap()
            .votes
            .iter()
            .find(|v| v.poll_id == poll.id && v.option_id == option.id && v.voter_id == voter)
            .cloned())
    }

    async fn list_user_poll_votes(&self, poll: &Poll, voter: UserId) -> Result<Vec<Vote>, ContextError> {
        self.record("list_user_poll_votes");
        Ok(self
            .votes_of(voter)
            .into_iter()
            .filter(|v| v.poll_id == poll.id)
            .collect())
    }

    async fn list_poll_options_by_ids(
        &self,
        poll: &Poll,
        option_ids: &[OptionId],
    ) -> Result<Vec<PollOption>, ContextError> {
        self.record("list_poll_options_by_ids");
        let store = self.store.lock().unwrap();
        Ok(poll
            .options
            .iter()
            .filter(|o| option_ids.contains(&o.id) && !store.deleted_options.contains(&o.id))
            .cloned()
            .collect())
    }

    async fn create_poll_option(
        &self,
        poll: &Poll,
        title: &str,
        suggested_by: UserId,
    ) -> Result<PollOption, ContextError> {
        self.write("create_poll_option").await?;
        let mut option = PollOption::new(poll.options.len() as i64 + 1, title);
        option.suggested_by = Some(suggested_by);
        Ok(option)
    }

    async fn delete_poll_option(
        &self,
        poll: &Poll,
        option_id: OptionId,
        requested_by: UserId,
    ) -> Result<(), ContextError> {
        self.record("delete_poll_option");
        let option = poll.option(option_id).ok_or(ContextError::OptionNotFound(option_id))?;
        if option.suggested_by != Some(requested_by) && poll.created_by != requested_by {
            return Err(ContextError::Unauthorized(format!("user {} did not suggest this", requested_by)));
        }
        self.delete_option(option_id);
        Ok(())
    }
}
