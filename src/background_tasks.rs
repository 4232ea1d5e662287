use std::time::Duration;

use crate::session;

async fn delete_expired_sessions(pool: &sqlx::SqlitePool) {
    let now = chrono::Utc::now().timestamp();
    match session::delete_expired(pool, now).await {
        Ok(rows_affected) => {
            if rows_affected > 0 {
                log::info!("deleted {} rows from table session", rows_affected);
            }
        }
        Err(e) => {
            log::error!("{}", e);
        }
    }
}

pub fn spawn_session_cleaner_task(pool: sqlx::SqlitePool) {
    actix_rt::spawn(async move {
        // every hour
        let hours = 1;
        let seconds = hours * 60 * 60;
        let mut interval = actix_rt::time::interval(Duration::from_secs(seconds));
        loop {
            interval.tick().await;
            delete_expired_sessions(&pool).await;
        }
    });
}
