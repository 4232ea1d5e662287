//! Loading questions and their choices from a JSON file.
//!
//! ```json
//! [
//!   {
//!     "id": 1,
//!     "question_text": "What's new?",
//!     "publication_date": "2024-01-01T00:00:00Z",
//!     "end_date": "2024-02-01T00:00:00Z",
//!     "choices": ["Not much", "The sky"]
//!   }
//! ]
//! ```
//!
//! Loading is repeatable: a question whose `id` is already taken is skipped.
//! Without an `id`, a question with the same text and publication date counts
//! as already loaded.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const MAX_TEXT_LENGTH: usize = 200;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct QuestionFixture {
    #[serde(default)]
    pub id: Option<i64>,
    pub question_text: String,
    pub publication_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub choices: Vec<String>,
}

fn check_text(kind: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!("{kind} is empty");
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        bail!("{kind} is longer than {MAX_TEXT_LENGTH} characters");
    }
    Ok(())
}

impl QuestionFixture {
    fn validate(&self) -> Result<()> {
        check_text("question_text", &self.question_text)?;
        if self.end_date < self.publication_date {
            bail!(
                "end_date of {:?} is before its publication_date",
                self.question_text
            );
        }
        for choice in &self.choices {
            check_text("choice_text", choice)?;
        }
        Ok(())
    }
}

pub fn parse(json: &str) -> Result<Vec<QuestionFixture>> {
    let questions: Vec<QuestionFixture> =
        serde_json::from_str(json).context("fixture is not a list of questions")?;
    for question in &questions {
        question.validate()?;
    }
    Ok(questions)
}

pub async fn load_fixture(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    let questions = parse(&json)?;
    insert_questions(pool, &questions).await
}

async fn already_loaded(
    connection: &mut sqlx::SqliteConnection,
    question: &QuestionFixture,
) -> sqlx::Result<bool> {
    let existing: Option<i64> = match question.id {
        Some(id) => {
            sqlx::query_scalar(r#"select id from question where id = $1"#)
                .bind(id)
                .fetch_optional(connection)
                .await?
        }
        None => {
            sqlx::query_scalar(
                r#"select id from question where question_text = $1 and publication_date = $2"#,
            )
            .bind(&question.question_text)
            .bind(question.publication_date)
            .fetch_optional(connection)
            .await?
        }
    };
    Ok(existing.is_some())
}

/// Inserts all questions not loaded before, with their choices, in one
/// transaction. Returns the number of questions written.
pub async fn insert_questions(pool: &SqlitePool, questions: &[QuestionFixture]) -> Result<usize> {
    let mut transaction = pool.begin().await?;
    let mut written = 0;

    for question in questions {
        if already_loaded(transaction.as_mut(), question).await? {
            log::debug!("question {:?} is already loaded", question.question_text);
            continue;
        }

        // a null id lets sqlite pick the next one
        let question_id: i64 = sqlx::query_scalar(
            r#"insert into question (id, question_text, publication_date, end_date)
            values ($1, $2, $3, $4) returning id"#,
        )
        .bind(question.id)
        .bind(&question.question_text)
        .bind(question.publication_date)
        .bind(question.end_date)
        .fetch_one(transaction.as_mut())
        .await?;
        written += 1;

        if question.choices.is_empty() {
            continue;
        }

        let mut choice_insert_query_builder =
            QueryBuilder::<Sqlite>::new(r#"insert into choice (question_id, choice_text) "#);
        choice_insert_query_builder.push_values(question.choices.iter(), |mut b, choice| {
            b.push_bind(question_id).push_bind(choice);
        });
        choice_insert_query_builder
            .build()
            .execute(transaction.as_mut())
            .await?;
    }

    transaction.commit().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    const FIXTURE: &str = r#"[
        {
            "question_text": "What's new?",
            "publication_date": "2024-01-01T00:00:00Z",
            "end_date": "2024-02-01T00:00:00Z",
            "choices": ["Not much", "The sky"]
        },
        {
            "question_text": "Anything else?",
            "publication_date": "2024-01-02T00:00:00Z",
            "end_date": "2024-01-03T00:00:00Z"
        }
    ]"#;

    #[test]
    fn parses_questions_with_and_without_choices() {
        let questions = parse(FIXTURE).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].choices, vec!["Not much", "The sky"]);
        assert!(questions[1].choices.is_empty());
    }

    #[test]
    fn rejects_inverted_window() {
        let json = r#"[{
            "question_text": "Backwards?",
            "publication_date": "2024-02-01T00:00:00Z",
            "end_date": "2024-01-01T00:00:00Z"
        }]"#;
        assert!(parse(json).is_err());
    }

    #[test]
    fn rejects_overlong_choice() {
        let json = format!(
            r#"[{{
                "question_text": "Long?",
                "publication_date": "2024-01-01T00:00:00Z",
                "end_date": "2024-01-02T00:00:00Z",
                "choices": ["{}"]
            }}]"#,
            "x".repeat(201)
        );
        assert!(parse(&json).is_err());
    }

    #[actix_web::test]
    async fn inserts_questions_and_choices() {
        let pool = test_support::pool().await;
        let written = insert_questions(&pool, &parse(FIXTURE).unwrap())
            .await
            .unwrap();
        assert_eq!(written, 2);

        let questions: i64 = sqlx::query_scalar("select count(*) from question")
            .fetch_one(&pool)
            .await
            .unwrap();
        let choices: i64 = sqlx::query_scalar("select count(*) from choice")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((questions, choices), (2, 2));
    }

    async fn counts(pool: &SqlitePool) -> (i64, i64) {
        let questions: i64 = sqlx::query_scalar("select count(*) from question")
            .fetch_one(pool)
            .await
            .unwrap();
        let choices: i64 = sqlx::query_scalar("select count(*) from choice")
            .fetch_one(pool)
            .await
            .unwrap();
        (questions, choices)
    }

    #[actix_web::test]
    async fn loading_twice_keeps_one_copy() {
        let pool = test_support::pool().await;
        let questions = parse(FIXTURE).unwrap();
        assert_eq!(insert_questions(&pool, &questions).await.unwrap(), 2);
        assert_eq!(insert_questions(&pool, &questions).await.unwrap(), 0);
        assert_eq!(counts(&pool).await, (2, 2));
    }

    #[actix_web::test]
    async fn bundled_fixture_survives_restarts() {
        let pool = test_support::pool().await;
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/polls.json");
        let first = load_fixture(&pool, &path).await.unwrap();
        let second = load_fixture(&pool, &path).await.unwrap();
        assert_eq!((first, second), (2, 0));
        assert_eq!(counts(&pool).await, (2, 6));
    }

    #[actix_web::test]
    async fn fixture_ids_are_kept_and_not_reused() {
        let pool = test_support::pool().await;
        let json = r#"[{
            "id": 7,
            "question_text": "Numbered?",
            "publication_date": "2024-01-01T00:00:00Z",
            "end_date": "2024-01-02T00:00:00Z",
            "choices": ["Yes"]
        }]"#;
        let questions = parse(json).unwrap();
        insert_questions(&pool, &questions).await.unwrap();

        // a renamed question with the same id is still the same question
        let mut renamed = questions.clone();
        renamed[0].question_text = "Renamed?".to_string();
        assert_eq!(insert_questions(&pool, &renamed).await.unwrap(), 0);

        let ids: Vec<i64> = sqlx::query_scalar("select id from question")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(ids, vec![7]);
    }

    #[actix_web::test]
    async fn deleting_a_question_removes_its_choices() {
        let pool = test_support::pool().await;
        insert_questions(&pool, &parse(FIXTURE).unwrap())
            .await
            .unwrap();

        sqlx::query("delete from question where question_text = $1")
            .bind("What's new?")
            .execute(&pool)
            .await
            .unwrap();
        let choices: i64 = sqlx::query_scalar("select count(*) from choice")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(choices, 0);
    }
}
