//! Server side sessions and one-shot flash messages.
//!
//! The browser only holds the session key in the `sessionid` cookie, everything
//! else lives in the `session` table.

use actix_web::{
    cookie::{time, Cookie, SameSite},
    HttpRequest,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: Level,
    pub text: String,
}

impl FlashMessage {
    pub fn error(text: impl Into<String>) -> Self {
        FlashMessage {
            level: Level::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        FlashMessage {
            level: Level::Info,
            text: text.into(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_key: String,
    user_id: Option<i64>,
    messages: String,
    expire_at: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub user_id: Option<i64>,
    pub messages: Vec<FlashMessage>,
    /// unix seconds
    pub expire_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        let messages = serde_json::from_str(&row.messages).unwrap_or_else(|e| {
            log::warn!("dropping unreadable messages of a session: {}", e);
            Vec::new()
        });
        Session {
            key: row.session_key,
            user_id: row.user_id,
            messages,
            expire_at: row.expire_at,
        }
    }
}

fn encode_messages(messages: &[FlashMessage]) -> String {
    // a vec of plain structs always serializes
    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string())
}

fn session_cookie(key: String, lifetime: chrono::Duration) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, key)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(lifetime.num_seconds()))
        .finish()
}

/// Returns the live session referenced by the request's cookie, if any.
pub async fn load(pool: &SqlitePool, request: &HttpRequest) -> sqlx::Result<Option<Session>> {
    let Some(cookie) = request.cookie(SESSION_COOKIE) else {
        return Ok(None);
    };
    let row = sqlx::query_as::<_, SessionRow>(
        r#"select session_key, user_id, messages, expire_at from session
        where session_key = $1 and expire_at > $2"#,
    )
    .bind(cookie.value())
    .bind(Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Session::from))
}

/// Id of the logged in user behind the request, if any.
pub async fn current_user_id(pool: &SqlitePool, request: &HttpRequest) -> sqlx::Result<Option<i64>> {
    Ok(load(pool, request).await?.and_then(|session| session.user_id))
}

async fn create(
    pool: &SqlitePool,
    user_id: Option<i64>,
    messages: &[FlashMessage],
    lifetime: chrono::Duration,
) -> sqlx::Result<Session> {
    let key = uuid::Uuid::new_v4().simple().to_string();
    let expire_at = (Utc::now() + lifetime).timestamp();
    sqlx::query(
        r#"insert into session (session_key, user_id, messages, expire_at) values ($1, $2, $3, $4)"#,
    )
    .bind(&key)
    .bind(user_id)
    .bind(encode_messages(messages))
    .bind(expire_at)
    .execute(pool)
    .await?;
    Ok(Session {
        key,
        user_id,
        messages: messages.to_vec(),
        expire_at,
    })
}

async fn store_messages(pool: &SqlitePool, session: &Session) -> sqlx::Result<()> {
    sqlx::query(r#"update session set messages = $1 where session_key = $2"#)
        .bind(encode_messages(&session.messages))
        .bind(&session.key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Queues a message for the next rendered page.
///
/// Anonymous visitors get a fresh session, the returned cookie has to be
/// attached to the response in that case.
pub async fn add_message(
    pool: &SqlitePool,
    request: &HttpRequest,
    lifetime: chrono::Duration,
    message: FlashMessage,
) -> sqlx::Result<Option<Cookie<'static>>> {
    match load(pool, request).await? {
        Some(mut session) => {
            session.messages.push(message);
            store_messages(pool, &session).await?;
            Ok(None)
        }
        None => {
            let session = create(pool, None, &[message], lifetime).await?;
            Ok(Some(session_cookie(session.key, lifetime)))
        }
    }
}

/// Removes and returns the pending messages of `session`.
pub async fn take_messages(
    pool: &SqlitePool,
    session: &mut Session,
) -> sqlx::Result<Vec<FlashMessage>> {
    if session.messages.is_empty() {
        return Ok(Vec::new());
    }
    let messages = std::mem::take(&mut session.messages);
    store_messages(pool, session).await?;
    Ok(messages)
}

/// Binds a new session to `user_id`. The old key is discarded, pending
/// messages move over to the new session.
pub async fn login(
    pool: &SqlitePool,
    request: &HttpRequest,
    user_id: i64,
    lifetime: chrono::Duration,
) -> sqlx::Result<Cookie<'static>> {
    let mut messages = Vec::new();
    if let Some(old) = load(pool, request).await? {
        delete(pool, &old.key).await?;
        messages = old.messages;
    }
    let session = create(pool, Some(user_id), &messages, lifetime).await?;
    Ok(session_cookie(session.key, lifetime))
}

/// Drops the current session and returns a cookie that clears it in the browser.
pub async fn logout(pool: &SqlitePool, request: &HttpRequest) -> sqlx::Result<Cookie<'static>> {
    if let Some(cookie) = request.cookie(SESSION_COOKIE) {
        delete(pool, cookie.value()).await?;
    }
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    Ok(cookie)
}

async fn delete(pool: &SqlitePool, key: &str) -> sqlx::Result<()> {
    sqlx::query(r#"delete from session where session_key = $1"#)
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes every session that expired at or before `now` (unix seconds).
pub async fn delete_expired(pool: &SqlitePool, now: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(r#"delete from session where expire_at <= $1"#)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
