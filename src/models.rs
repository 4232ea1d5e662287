use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// four tables
// question: text plus the window in which it is visible and votable
// choice: answer text, belongs to a question
// vote: one row per cast vote, counted per choice
// user_account: who cast the vote

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub publication_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Question {
    /// true if the question went public during the day before `now`
    pub fn was_published_recently_at(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.publication_date && self.publication_date <= now
    }

    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.publication_date
    }

    /// both ends of the window are inclusive
    pub fn can_vote_at(&self, now: DateTime<Utc>) -> bool {
        self.publication_date <= now && now <= self.end_date
    }

    pub fn was_published_recently(&self) -> bool {
        self.was_published_recently_at(Utc::now())
    }

    pub fn is_published(&self) -> bool {
        self.is_published_at(Utc::now())
    }

    pub fn can_vote(&self) -> bool {
        self.can_vote_at(Utc::now())
    }
}

/// A choice together with the number of votes cast for it.
///
/// `votes` is never stored, it is always counted from the vote table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub votes: i64,
}

#[derive(Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub choice_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    // argon2 phc string, never the raw password
    pub password: String,
    pub date_joined: DateTime<Utc>,
}
