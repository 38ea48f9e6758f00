pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod reconciler;
pub mod session;
pub mod voting;

pub use error::{Result, VoteAction, VoteError};
pub use gateway::{ContextError, EventsContext, VoteGateway};
pub use handlers::{Outcome, SharedSession, UiEvent, Voter, VotingSession};
pub use models::{OptionId, Poll, PollId, PollOption, PollPhase, RankedEntry, UserId, Vote, VotingSystem};
pub use reconciler::{derive_ranked_option_list, derive_state, RankedOptionList, VoteSource, VoteState};
pub use session::{SessionVotes, TemporaryVoteSet};
pub use voting::{validate, BinaryChoice, Rank, StarRating, VoteValue};
