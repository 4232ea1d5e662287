use actix_web::{cookie::Cookie, test::TestRequest, web};
use chrono::{Duration, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{fixtures, password, session, templates, AppData};

/// Builds the app the way `main` does, on top of `$app_data`.
macro_rules! test_app {
    ($app_data:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($app_data)
                .wrap(actix_web::middleware::NormalizePath::new(
                    actix_web::middleware::TrailingSlash::Always,
                ))
                .configure($crate::routes::configure_routes),
        )
        .await
    };
}
pub(crate) use test_app;

/// Fresh in-memory database with the schema applied.
pub async fn pool() -> SqlitePool {
    // every connection to :memory: is its own database, so keep exactly one alive
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

pub fn app_data(pool: SqlitePool) -> web::Data<AppData> {
    web::Data::new(AppData {
        pool,
        templates: templates::load().unwrap(),
        session_lifetime: Duration::hours(1),
    })
}

pub async fn create_user(pool: &SqlitePool, username: &str, raw_password: &str) -> i64 {
    sqlx::query_scalar(
        "insert into user_account (username, password, date_joined) values ($1, $2, $3) returning id",
    )
    .bind(username)
    .bind(password::hash_password(raw_password).unwrap())
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn login_cookie(pool: &SqlitePool, user_id: i64) -> Cookie<'static> {
    let request = TestRequest::default().to_http_request();
    session::login(pool, &request, user_id, Duration::hours(1))
        .await
        .unwrap()
}

/// Inserts a question whose window is given relative to now, returns its id.
pub async fn seed_question(
    pool: &SqlitePool,
    question_text: &str,
    opens_in: Duration,
    closes_in: Duration,
    choices: &[&str],
) -> i64 {
    let now = Utc::now();
    let question = fixtures::QuestionFixture {
        id: None,
        question_text: question_text.to_string(),
        publication_date: now + opens_in,
        end_date: now + closes_in,
        choices: choices.iter().map(|choice| choice.to_string()).collect(),
    };
    fixtures::insert_questions(pool, &[question]).await.unwrap();
    sqlx::query_scalar("select id from question where question_text = $1")
        .bind(question_text)
        .fetch_one(pool)
        .await
        .unwrap()
}
