use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{PollId, UserId};

const DEFAULT_DATABASE_URL: &str = "sqlite:eventasaurus_polls.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be an integer, got {value:?}")]
    NotAnInteger { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Poll the console opens.
    pub poll_id: Option<PollId>,
    /// Signed-in voter. Unset means an anonymous visitor.
    pub user_id: Option<UserId>,
    /// File holding an anonymous visitor's carried session votes between runs.
    pub session_votes_path: Option<PathBuf>,
}

impl Config {
    /// Read configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections =
            parse_int::<u32, _>(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_MAX_CONNECTIONS);

        Ok(Self {
            database_url,
            max_connections,
            poll_id: parse_int(&lookup, "POLL_ID")?,
            user_id: parse_int(&lookup, "USER_ID")?,
            session_votes_path: lookup("SESSION_VOTES_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_int<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::NotAnInteger { key, value }),
        None => Ok(None),
    }
}
