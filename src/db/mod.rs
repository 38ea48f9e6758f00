use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite};

use crate::config::Config;
use crate::gateway::{ContextError, EventsContext};
use crate::models::{
    OptionId, Poll, PollId, PollOption, PollPhase, RankedEntry, UserId, Vote, VotingSystem,
};
use crate::voting::{approval, BinaryChoice, Rank, StarRating, VoteValue};

type DbResult<T> = Result<T, ContextError>;

const VOTE_COLUMNS: &str =
    "id, poll_id, poll_option_id, voter_id, voting_system, vote_value, vote_numeric, cast_at";

pub struct SqliteEvents {
    pool: SqlitePool,
}

/// Each connection to `:memory:` opens its own empty database, so those pools hold one.
fn pool_size(config: &Config) -> u32 {
    if config.database_url.contains(":memory:") {
        1
    } else {
        config.max_connections
    }
}

impl SqliteEvents {
    pub async fn connect(config: &Config) -> DbResult<Self> {
        let db_url = &config.database_url;

        // Create database if it doesn't exist
        if !db_url.contains(":memory:") && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        // Connect to the database
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size(config))
            .connect(db_url)
            .await?;

        // Initialize schema
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(pool: &SqlitePool) -> DbResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                voting_system TEXT NOT NULL,
                max_rank INTEGER,
                phase TEXT NOT NULL,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                rankable BOOLEAN NOT NULL DEFAULT TRUE,
                suggested_by INTEGER,
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL,
                poll_option_id INTEGER NOT NULL,
                voter_id INTEGER NOT NULL,
                voting_system TEXT NOT NULL,
                vote_value TEXT,
                vote_numeric INTEGER,
                cast_at TEXT NOT NULL,
                UNIQUE (poll_option_id, voter_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE,
                FOREIGN KEY (poll_option_id) REFERENCES poll_options(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Create a poll in the voting phase with the given options.
    pub async fn create_poll(
        &self,
        title: &str,
        voting_system: VotingSystem,
        max_rank: Option<u32>,
        created_by: UserId,
        option_titles: &[&str],
    ) -> DbResult<Poll> {
        let poll_id = sqlx::query(
            r#"
            INSERT INTO polls (title, voting_system, max_rank, phase, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(voting_system.as_str())
        .bind(max_rank.map(i64::from))
        .bind(PollPhase::Voting.as_str())
        .bind(created_by)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        // Insert poll options
        for option_title in option_titles {
            self.insert_option(poll_id, option_title, None).await?;
        }

        self.get_poll(poll_id).await
    }

    async fn insert_option(&self, poll_id: PollId, title: &str, suggested_by: Option<UserId>) -> DbResult<PollOption> {
        let id = sqlx::query(
            r#"
            INSERT INTO poll_options (poll_id, title, rankable, suggested_by)
            VALUES (?, ?, TRUE, ?)
            "#,
        )
        .bind(poll_id)
        .bind(title)
        .bind(suggested_by)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(PollOption {
            id,
            title: title.to_string(),
            rankable: true,
            suggested_by,
        })
    }

    pub async fn get_poll(&self, poll_id: PollId) -> DbResult<Poll> {
        let row = sqlx::query(
            r#"
            SELECT id, title, voting_system, max_rank, phase, created_by
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ContextError::NotFound(format!("poll {}", poll_id)))?;

        // Parse voting system and phase
        let voting_system_str = row.get::<String, _>("voting_system");
        let voting_system = VotingSystem::parse(&voting_system_str)
            .ok_or_else(|| ContextError::Failed(format!("Unknown voting system: {}", voting_system_str)))?;
        let phase_str = row.get::<String, _>("phase");
        let phase = PollPhase::parse(&phase_str)
            .ok_or_else(|| ContextError::Failed(format!("Unknown poll phase: {}", phase_str)))?;

        // Get options
        let options = sqlx::query(
            r#"
            SELECT id, title, rankable, suggested_by
            FROM poll_options
            WHERE poll_id = ?
            ORDER BY id
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(option_from_row)
        .collect();

        Ok(Poll {
            id: row.get("id"),
            title: row.get("title"),
            voting_system,
            max_rank: row
                .get::<Option<i64>, _>("max_rank")
                .and_then(|cap| u32::try_from(cap).ok()),
            phase,
            created_by: row.get("created_by"),
            options,
        })
    }

    pub async fn set_phase(&self, poll_id: PollId, phase: PollPhase) -> DbResult<()> {
        sqlx::query("UPDATE polls SET phase = ? WHERE id = ?")
            .bind(phase.as_str())
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_option(&self, poll: &Poll, option_id: OptionId) -> DbResult<()> {
        let exists = sqlx::query("SELECT 1 FROM poll_options WHERE id = ? AND poll_id = ?")
            .bind(option_id)
            .bind(poll.id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(ContextError::OptionNotFound(option_id))
        }
    }

    /// Insert or replace the voter's vote on one option.
    async fn upsert_vote(&self, poll: &Poll, option: &PollOption, voter: UserId, value: VoteValue) -> DbResult<Vote> {
        self.ensure_option(poll, option.id).await?;
        let (text, numeric) = encode_value(&value);

        sqlx::query(
            r#"
            INSERT INTO poll_votes (poll_id, poll_option_id, voter_id, voting_system, vote_value, vote_numeric, cast_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(poll_option_id, voter_id)
            DO UPDATE SET voting_system = excluded.voting_system,
                          vote_value = excluded.vote_value,
                          vote_numeric = excluded.vote_numeric,
                          cast_at = excluded.cast_at
            "#,
        )
        .bind(poll.id)
        .bind(option.id)
        .bind(voter)
        .bind(value.system().as_str())
        .bind(text)
        .bind(numeric)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_vote(option.id, voter)
            .await?
            .ok_or_else(|| ContextError::Failed(format!("vote on option {} vanished after write", option.id)))
    }

    async fn find_vote(&self, option_id: OptionId, voter: UserId) -> DbResult<Option<Vote>> {
        let query = format!(
            "SELECT {} FROM poll_votes WHERE poll_option_id = ? AND voter_id = ?",
            VOTE_COLUMNS
        );
        sqlx::query(&query)
            .bind(option_id)
            .bind(voter)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| vote_from_row(&row))
            .transpose()
    }
}

#[async_trait]
impl EventsContext for SqliteEvents {
    async fn cast_binary_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        choice: BinaryChoice,
    ) -> DbResult<Vote> {
        self.upsert_vote(poll, option, voter, VoteValue::Binary(choice)).await
    }

    async fn cast_approval_vote(&self, poll: &Poll, option: &PollOption, voter: UserId) -> DbResult<Vote> {
        self.upsert_vote(poll, option, voter, VoteValue::Approval).await
    }

    async fn cast_star_vote(
        &self,
        poll: &Poll,
        option: &PollOption,
        voter: UserId,
        rating: StarRating,
    ) -> DbResult<Vote> {
        self.upsert_vote(poll, option, voter, VoteValue::Star(rating)).await
    }

    async fn cast_ranked_votes(&self, poll: &Poll, voter: UserId, ranking: &[RankedEntry]) -> DbResult<Vec<Vote>> {
        let mut tx = self.pool.begin().await?;

        // Replace the whole ballot

        sqlx::query("DELETE FROM poll_votes WHERE poll_id = ? AND voter_id = ?")
            .bind(poll.id)
            .bind(voter)
            .execute(&mut *tx)
            .await?;

        let cast_at = Utc::now().to_rfc3339();
        for entry in ranking {
            let exists = sqlx::query("SELECT 1 FROM poll_options WHERE id = ? AND poll_id = ?")
                .bind(entry.option_id)
                .bind(poll.id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if !exists {
                // Dropping the transaction rolls back the delete above.
                return Err(ContextError::OptionNotFound(entry.option_id));
            }

            sqlx::query(
                r#"
                INSERT INTO poll_votes (poll_id, poll_option_id, voter_id, voting_system, vote_value, vote_numeric, cast_at)
                VALUES (?, ?, ?, ?, NULL, ?, ?)
                "#,
            )
            .bind(poll.id)
            .bind(entry.option_id)
            .bind(voter)
            .bind(VotingSystem::Ranked.as_str())
            .bind(i64::from(entry.rank))
            .bind(&cast_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored {} ranked vote(s) on poll {} for user {}", ranking.len(), poll.id, voter);

        // Return the stored ballot in rank order
        let mut votes = self.list_user_poll_votes(poll, voter).await?;
        votes.sort_by_key(|vote| vote.value.rank());
        Ok(votes)
    }

    async fn delete_poll_vote(&self, vote: &Vote) -> DbResult<()> {
        sqlx::query("DELETE FROM poll_votes WHERE id = ?")
            .bind(vote.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_user_poll_votes(&self, poll: &Poll, voter: UserId) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM poll_votes WHERE poll_id = ? AND voter_id = ?")
            .bind(poll.id)
            .bind(voter)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_user_poll_vote(&self, poll: &Poll, option: &PollOption, voter: UserId) -> DbResult<Option<Vote>> {
        Ok(self
            .find_vote(option.id, voter)
            .await?
            .filter(|vote| vote.poll_id == poll.id))
    }

    async fn list_user_poll_votes(&self, poll: &Poll, voter: UserId) -> DbResult<Vec<Vote>> {
        let query = format!(
            "SELECT {} FROM poll_votes WHERE poll_id = ? AND voter_id = ? ORDER BY poll_option_id",
            VOTE_COLUMNS
        );
        sqlx::query(&query)
            .bind(poll.id)
            .bind(voter)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(vote_from_row)
            .collect()
    }

    async fn list_poll_options_by_ids(&self, poll: &Poll, option_ids: &[OptionId]) -> DbResult<Vec<PollOption>> {
        if option_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Build the IN clause
        let placeholders = vec!["?"; option_ids.len()].join(", ");
        let query = format!(
            "SELECT id, title, rankable, suggested_by FROM poll_options WHERE poll_id = ? AND id IN ({})",
            placeholders
        );
        let mut q = sqlx::query(&query).bind(poll.id);
        for option_id in option_ids {
            q = q.bind(*option_id);
        }
        Ok(q.fetch_all(&self.pool).await?.iter().map(option_from_row).collect())
    }

    async fn create_poll_option(&self, poll: &Poll, title: &str, suggested_by: UserId) -> DbResult<PollOption> {
        self.insert_option(poll.id, title, Some(suggested_by)).await
    }

    async fn delete_poll_option(&self, poll: &Poll, option_id: OptionId, requested_by: UserId) -> DbResult<()> {
        let row = sqlx::query("SELECT suggested_by FROM poll_options WHERE id = ? AND poll_id = ?")
            .bind(option_id)
            .bind(poll.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ContextError::OptionNotFound(option_id))?;

        // Only the suggester or the poll creator may remove an option
        let suggested_by: Option<UserId> = row.get("suggested_by");
        if suggested_by != Some(requested_by) && poll.created_by != requested_by {
            return Err(ContextError::Unauthorized(format!(
                "user {} may not delete option {}",
                requested_by, option_id
            )));
        }

        // Remove its votes along with it
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM poll_votes WHERE poll_option_id = ?")
            .bind(option_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM poll_options WHERE id = ?")
            .bind(option_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn encode_value(value: &VoteValue) -> (Option<&'static str>, Option<i64>) {
    match value {
        VoteValue::Binary(choice) => (Some(choice.as_str()), None),
        VoteValue::Approval => (Some(approval::SELECTED), None),
        VoteValue::Star(rating) => (None, Some(i64::from(*rating))),
        VoteValue::Ranked(rank) => (None, Some(i64::from(*rank))),
    }
}

fn option_from_row(row: &SqliteRow) -> PollOption {
    PollOption {
        id: row.get("id"),
        title: row.get("title"),
        rankable: row.get("rankable"),
        suggested_by: row.get("suggested_by"),
    }
}

fn vote_from_row(row: &SqliteRow) -> DbResult<Vote> {
    let system_str = row.get::<String, _>("voting_system");
    let text: Option<String> = row.get("vote_value");
    let numeric: Option<i64> = row.get("vote_numeric");
    let corrupt = || ContextError::Failed(format!("Malformed {} vote {}", system_str, row.get::<i64, _>("id")));

    let value = match VotingSystem::parse(&system_str).ok_or_else(corrupt)? {
        VotingSystem::Binary => VoteValue::Binary(
            text.as_deref().and_then(BinaryChoice::parse).ok_or_else(corrupt)?,
        ),
        VotingSystem::Approval => VoteValue::Approval,
        VotingSystem::Star => VoteValue::Star(numeric.and_then(StarRating::new).ok_or_else(corrupt)?),
        VotingSystem::Ranked => VoteValue::Ranked(numeric.and_then(Rank::new).ok_or_else(corrupt)?),
    };

    let cast_at_str = row.get::<String, _>("cast_at");
    let cast_at = DateTime::parse_from_rfc3339(&cast_at_str)
        .map_err(|e| ContextError::Failed(format!("Failed to parse cast_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Vote {
        id: row.get("id"),
        poll_id: row.get("poll_id"),
        option_id: row.get("poll_option_id"),
        voter_id: row.get("voter_id"),
        value,
        cast_at,
    })
}
