use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite://polls.db?mode=rwc";
// two weeks
const DEFAULT_SESSION_LIFETIME_SECS: i64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_address: String,
    pub port: u16,
    pub session_lifetime: chrono::Duration,
    /// questions to load on startup, see `fixtures`
    pub fixture_path: Option<PathBuf>,
}

impl Settings {
    /// Reads the settings from the process environment and an optional `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(port) => port.parse::<u16>().context("Could not parse PORT")?,
            None => 1337,
        };
        let session_lifetime_secs = match lookup("SESSION_LIFETIME_SECS") {
            Some(secs) => secs
                .parse::<i64>()
                .context("Could not parse SESSION_LIFETIME_SECS")?,
            None => DEFAULT_SESSION_LIFETIME_SECS,
        };
        if session_lifetime_secs <= 0 {
            anyhow::bail!("SESSION_LIFETIME_SECS must be positive");
        }

        Ok(Settings {
            database_url: lookup("DATABASE_URL").unwrap_or(DEFAULT_DATABASE_URL.to_string()),
            bind_address: lookup("BIND_ADDRESS").unwrap_or("0.0.0.0".to_string()),
            port,
            session_lifetime: chrono::Duration::seconds(session_lifetime_secs),
            fixture_path: lookup("FIXTURE_PATH").map(PathBuf::from),
        })
    }
}
