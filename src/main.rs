use log::{error, info, warn};
use poll_votes::config::Config;
use poll_votes::db::SqliteEvents;
use poll_votes::{
    EventsContext, Outcome, SessionVotes, UiEvent, VoteGateway, VoteValue, Voter, VotingSession,
    VotingSystem,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

async fn load_session_votes(path: Option<&Path>) -> SessionVotes {
    let Some(path) = path else {
        return SessionVotes::new();
    };
    // A corrupt bag starts a fresh session
    SessionVotes::load(path).await.unwrap_or_else(|e| {
        warn!("Ignoring session votes in {}: {}", path.display(), e);
        SessionVotes::new()
    })
}

fn render<C: EventsContext>(session: &VotingSession<C>) -> String {
    let poll = session.poll();
    let mut summary = format!("**{}**\n{} voting\n\n", poll.title, poll.voting_system);

    match poll.voting_system {
        VotingSystem::Ranked => {
            for (index, option) in session.ranking().options().iter().enumerate() {
                summary.push_str(&format!("#{}: {}\n", index + 1, option.title));
            }
            for option in &poll.options {
                if !session.ranking().contains(option.id) {
                    summary.push_str(&format!("Unranked: {}\n", option.title));
                }
            }
        }
        VotingSystem::Binary | VotingSystem::Approval | VotingSystem::Star => {
            for option in &poll.options {
                let mark = match session.state().get(option.id) {
                    Some(VoteValue::Binary(choice)) => choice.to_string(),
                    Some(VoteValue::Approval) => "✅".to_string(),
                    Some(VoteValue::Star(rating)) => "⭐".repeat(rating.get() as usize),
                    Some(VoteValue::Ranked(rank)) => format!("#{}", rank.get()),
                    None => "-".to_string(),
                };
                summary.push_str(&format!("{} ({}): {}\n", option.title, option.id, mark));
            }
        }
    }

    if session.has_unsaved_votes() {
        summary.push_str("\nSign in to save your votes.\n");
    }
    summary
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };
    env_logger::init();

    let Some(poll_id) = config.poll_id else {
        error!("POLL_ID must be set");
        return;
    };

    let events = match SqliteEvents::connect(&config).await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    let poll = match events.get_poll(poll_id).await {
        Ok(poll) => poll,
        Err(e) => {
            error!("Failed to load poll {}: {}", poll_id, e);
            return;
        }
    };

    let gateway = VoteGateway::new(Arc::new(events));
    let mut session_votes = load_session_votes(config.session_votes_path.as_deref()).await;
    let mut session = match config.user_id {
        Some(user) => match VotingSession::mount_authenticated(gateway, poll, user).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to load votes for user {}: {}", user, e);
                return;
            }
        },
        None => {
            info!("Anonymous session {}", session_votes.session_id);
            VotingSession::mount_anonymous(gateway, poll, session_votes.discard(poll_id))
        }
    };
    println!("{}", render(&session));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // `save <user_id>` signs the visitor in and persists their votes.
        if let Some(user) = line.strip_prefix("save ") {
            match user.trim().parse() {
                Ok(user) => match session.persist_temporary(user).await {
                    Ok(votes) => println!("Saved {} vote(s).", votes.len()),
                    Err(e) => println!("{}", e.user_message()),
                },
                Err(_) => println!("Invalid input"),
            }
            println!("{}", render(&session));
            continue;
        }

        let result = match UiEvent::parse(line) {
            Ok(event) => session.handle(event).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Outcome::Applied) => println!("{}", render(&session)),
            Ok(Outcome::Unchanged) | Ok(Outcome::Ignored) => println!("No change."),
            Err(e) => {
                warn!("{} rejected: {}", line, e);
                println!("{}", e.user_message());
            }
        }
    }

    // Write the bag back; signed-in voters have nothing left to carry for this poll.
    if let Voter::Anonymous(temp) = session.voter() {
        session_votes.put(poll_id, temp.clone());
    }
    let carried = match &config.session_votes_path {
        Some(path) => session_votes.save(path).await,
        None => session_votes.to_json().map(|json| println!("{}", json)),
    };
    if let Err(e) = carried {
        error!("Failed to carry session votes: {}", e);
    }
}
