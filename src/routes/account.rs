use actix_web::{
    http::header,
    web::{self, ServiceConfig},
    HttpRequest, HttpResponse, Responder,
};
use chrono::Utc;

use crate::{
    models,
    password::{hash_password, verify_password},
    routes::{html, render_page, INTERNAL_SERVER_ERROR},
    session::{self, FlashMessage},
    AppData,
};

const MAX_USERNAME_LENGTH: usize = 150;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignupError {
    #[error("A username is required.")]
    UsernameMissing,
    #[error("Ensure the username has at most 150 characters.")]
    UsernameTooLong,
    #[error("Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.")]
    UsernameInvalid,
    #[error("A user with that username already exists.")]
    UsernameTaken,
    #[error("The two password fields didn't match.")]
    PasswordMismatch,
    #[error("This password is too short. It must contain at least 8 characters.")]
    PasswordTooShort,
    #[error("This password is entirely numeric.")]
    PasswordNumeric,
}

#[derive(Debug, Default, serde::Deserialize)]
struct SignupForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password1: String,
    #[serde(default)]
    password2: String,
}

fn validate_signup(form: &SignupForm) -> Vec<SignupError> {
    let mut errors = Vec::new();

    let username = form.username.trim();
    if username.is_empty() {
        errors.push(SignupError::UsernameMissing);
    } else if username.chars().count() > MAX_USERNAME_LENGTH {
        errors.push(SignupError::UsernameTooLong);
    } else if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        errors.push(SignupError::UsernameInvalid);
    }

    if form.password1 != form.password2 {
        errors.push(SignupError::PasswordMismatch);
    } else if form.password1.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(SignupError::PasswordTooShort);
    } else if form.password1.chars().all(|c| c.is_ascii_digit()) {
        errors.push(SignupError::PasswordNumeric);
    }

    errors
}

async fn username_taken(pool: &sqlx::SqlitePool, username: &str) -> sqlx::Result<bool> {
    let existing: Option<i64> =
        sqlx::query_scalar(r#"select id from user_account where username = $1"#)
            .bind(username)
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

async fn create_user(
    pool: &sqlx::SqlitePool,
    username: &str,
    raw_password: &str,
) -> anyhow::Result<models::User> {
    let password = hash_password(raw_password)?;
    let user = sqlx::query_as::<_, models::User>(
        r#"insert into user_account (username, password, date_joined) values ($1, $2, $3)
        returning id, username, password, date_joined"#,
    )
    .bind(username)
    .bind(password)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(user)
}

async fn retrieve_user(pool: &sqlx::SqlitePool, username: &str) -> sqlx::Result<Option<models::User>> {
    sqlx::query_as::<_, models::User>(
        r#"select id, username, password, date_joined from user_account where username = $1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

/// Only paths on this site are followed after login.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|next| next.starts_with('/') && !next.starts_with("//") && !next.contains('\\'))
}

async fn render_signup(
    app_data: &AppData,
    request: &HttpRequest,
    username: &str,
    errors: &[SignupError],
) -> HttpResponse {
    let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
    let mut context = tera::Context::new();
    context.insert("username", username);
    context.insert("errors", &errors);
    let body = unwrap_or_log_and_internal_server_error_response!(
        render_page(app_data, request, "registration/signup.html", context).await,
        INTERNAL_SERVER_ERROR
    );
    html(body)
}

async fn get_signup(app_data: web::Data<AppData>, request: HttpRequest) -> impl Responder {
    render_signup(&app_data, &request, "", &[]).await
}

async fn post_signup(
    app_data: web::Data<AppData>,
    request: HttpRequest,
    form: web::Form<SignupForm>,
) -> impl Responder {
    let pool = &app_data.pool;
    let form = form.into_inner();

    let mut errors = validate_signup(&form);
    let username = form.username.trim();
    if errors.is_empty() {
        let taken = unwrap_or_log_and_internal_server_error_response!(
            username_taken(pool, username).await,
            INTERNAL_SERVER_ERROR
        );
        if taken {
            errors.push(SignupError::UsernameTaken);
        }
    }
    if !errors.is_empty() {
        return render_signup(&app_data, &request, username, &errors).await;
    }

    let user = unwrap_or_log_and_internal_server_error_response!(
        create_user(pool, username, &form.password1).await,
        INTERNAL_SERVER_ERROR
    );
    log::info!("created user {}", user.username);

    let cookie = unwrap_or_log_and_internal_server_error_response!(
        session::login(pool, &request, user.id, app_data.session_lifetime).await,
        INTERNAL_SERVER_ERROR
    );
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/polls/"))
        .cookie(cookie)
        .finish()
}

#[derive(Debug, serde::Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

async fn render_login(
    app_data: &AppData,
    request: &HttpRequest,
    username: &str,
    next: Option<&str>,
    error_message: Option<&str>,
) -> HttpResponse {
    let mut context = tera::Context::new();
    context.insert("username", username);
    context.insert("next", safe_next(next).unwrap_or_default());
    if let Some(error_message) = error_message {
        context.insert("error_message", error_message);
    }
    let body = unwrap_or_log_and_internal_server_error_response!(
        render_page(app_data, request, "registration/login.html", context).await,
        INTERNAL_SERVER_ERROR
    );
    html(body)
}

async fn get_login(
    app_data: web::Data<AppData>,
    request: HttpRequest,
    query: web::Query<NextQuery>,
) -> impl Responder {
    render_login(&app_data, &request, "", query.next.as_deref(), None).await
}

async fn post_login(
    app_data: web::Data<AppData>,
    request: HttpRequest,
    form: web::Form<LoginForm>,
) -> impl Responder {
    let pool = &app_data.pool;
    let form = form.into_inner();

    let user = unwrap_or_log_and_internal_server_error_response!(
        retrieve_user(pool, form.username.trim()).await,
        INTERNAL_SERVER_ERROR
    );
    let authenticated = match &user {
        Some(user) => unwrap_or_log_and_internal_server_error_response!(
            verify_password(&form.password, &user.password),
            INTERNAL_SERVER_ERROR
        ),
        None => false,
    };
    let Some(user) = user.filter(|_| authenticated) else {
        return render_login(
            &app_data,
            &request,
            &form.username,
            form.next.as_deref(),
            Some("Please enter a correct username and password."),
        )
        .await;
    };

    let cookie = unwrap_or_log_and_internal_server_error_response!(
        session::login(pool, &request, user.id, app_data.session_lifetime).await,
        INTERNAL_SERVER_ERROR
    );
    let location = safe_next(form.next.as_deref()).unwrap_or("/polls/");
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .cookie(cookie)
        .finish()
}

async fn post_logout(app_data: web::Data<AppData>, request: HttpRequest) -> impl Responder {
    let pool = &app_data.pool;
    let removal_cookie = unwrap_or_log_and_internal_server_error_response!(
        session::logout(pool, &request).await,
        INTERNAL_SERVER_ERROR
    );
    // the old session is gone, so this starts a fresh anonymous one
    let new_session_cookie = unwrap_or_log_and_internal_server_error_response!(
        session::add_message(
            pool,
            &request,
            app_data.session_lifetime,
            FlashMessage::info("You have been logged out."),
        )
        .await,
        INTERNAL_SERVER_ERROR
    );
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/polls/"))
        .cookie(new_session_cookie.unwrap_or(removal_cookie))
        .finish()
}

pub fn configure_routes(config: &mut ServiceConfig) {
    config.route("/signup/", web::get().to(get_signup));
    config.route("/signup/", web::post().to(post_signup));
    config.route("/login/", web::get().to(get_login));
    config.route("/login/", web::post().to(post_login));
    config.route("/logout/", web::post().to(post_logout));
}
