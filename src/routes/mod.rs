use actix_web::{
    http::header::{self, ContentType},
    web::{self, ServiceConfig},
    HttpRequest, HttpResponse,
};

use crate::{
    session::{self, FlashMessage},
    AppData,
};

pub(crate) const INTERNAL_SERVER_ERROR: &str = "internal server error";

macro_rules! unwrap_or_log_and_internal_server_error_response {
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::error!("{}", e);
                return actix_web::HttpResponse::InternalServerError()
                    .content_type(actix_web::http::header::ContentType::plaintext())
                    .body($message);
            }
        }
    };
}

pub mod account;
pub mod poll;

/// Renders `template` with the visitor's pending messages and username added
/// to `context`. The messages are consumed only once the page rendered.
pub(crate) async fn render_page(
    app_data: &AppData,
    request: &HttpRequest,
    template: &str,
    mut context: tera::Context,
) -> anyhow::Result<String> {
    let pool = &app_data.pool;
    let mut session = session::load(pool, request).await?;
    let mut username: Option<String> = None;
    if let Some(user_id) = session.as_ref().and_then(|session| session.user_id) {
        username = sqlx::query_scalar(r#"select username from user_account where id = $1"#)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    }
    let messages = session
        .as_ref()
        .map(|session| session.messages.as_slice())
        .unwrap_or_default();
    context.insert("messages", messages);
    context.insert("user", &username);

    let body = app_data.templates.render(template, &context)?;
    if let Some(session) = session.as_mut() {
        session::take_messages(pool, session).await?;
    }
    Ok(body)
}

pub(crate) fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(body)
}

pub(crate) fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Redirects to `location` and shows `message` on the page found there.
pub(crate) async fn redirect_with_message(
    app_data: &AppData,
    request: &HttpRequest,
    location: &str,
    message: FlashMessage,
) -> HttpResponse {
    let new_session_cookie = unwrap_or_log_and_internal_server_error_response!(
        session::add_message(&app_data.pool, request, app_data.session_lifetime, message).await,
        INTERNAL_SERVER_ERROR
    );
    let mut response = HttpResponse::Found();
    response.insert_header((header::LOCATION, location));
    if let Some(cookie) = new_session_cookie {
        response.cookie(cookie);
    }
    response.finish()
}

async fn get_root() -> HttpResponse {
    redirect("/polls/")
}

pub fn configure_routes(config: &mut ServiceConfig) {
    config.route("/", web::get().to(get_root));
    config.service(web::scope("/polls").configure(poll::configure_routes));
    config.service(web::scope("/accounts").configure(account::configure_routes));
}
