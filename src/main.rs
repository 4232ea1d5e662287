use std::str::FromStr;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{background_tasks::spawn_session_cleaner_task, config::Settings};

mod config;
mod fixtures;
mod models;
mod password;
mod routes;
mod session;
mod templates;

mod background_tasks;

#[cfg(test)]
mod test_support;

struct AppData {
    pool: sqlx::SqlitePool,
    templates: tera::Tera,
    session_lifetime: chrono::Duration,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env file is fine, the environment may carry everything
    let dotenv_result = dotenvy::dotenv();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    if let Err(e) = dotenv_result {
        log::debug!("no .env file loaded: {}", e);
    }

    let settings = Settings::from_env()?;

    let connect_options = SqliteConnectOptions::from_str(&settings.database_url)
        .context("DATABASE_URL is not a valid sqlite url")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to migrate database")?;

    if let Some(fixture_path) = &settings.fixture_path {
        let loaded = fixtures::load_fixture(&pool, fixture_path).await?;
        log::info!("loaded {} questions from {}", loaded, fixture_path.display());
    }

    spawn_session_cleaner_task(pool.clone());

    let app_data = web::Data::new(AppData {
        pool,
        templates: templates::load().context("Failed to load templates")?,
        session_lifetime: settings.session_lifetime,
    });

    log::info!("Listening on {}:{}", settings.bind_address, settings.port);
    HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .wrap(middleware::NormalizePath::new(
                middleware::TrailingSlash::Always,
            ))
            .wrap(middleware::Logger::default())
            .configure(routes::configure_routes)
    })
    .bind((settings.bind_address.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
