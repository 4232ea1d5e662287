use actix_web::{
    http::header::ContentType,
    web::{self, ServiceConfig},
    HttpRequest, HttpResponse, Responder,
};
use chrono::{DateTime, Utc};

use crate::{
    models,
    routes::{html, redirect, redirect_with_message, render_page, INTERNAL_SERVER_ERROR},
    session::{self, FlashMessage},
    AppData,
};

const NO_CHOICE_SELECTED: &str = "You didn't select a choice.";

async fn retrieve_question(pool: &sqlx::SqlitePool, id: i64) -> sqlx::Result<Option<models::Question>> {
    sqlx::query_as::<_, models::Question>(
        r#"select id, question_text, publication_date, end_date from question where id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Questions visible at `now`, newest first.
async fn retrieve_published_questions(
    pool: &sqlx::SqlitePool,
    now: DateTime<Utc>,
) -> sqlx::Result<Vec<models::Question>> {
    let mut questions = sqlx::query_as::<_, models::Question>(
        r#"select id, question_text, publication_date, end_date from question"#,
    )
    .fetch_all(pool)
    .await?;
    // timestamps are stored as text, so the window is checked here and not in sql
    questions.retain(|question| question.is_published_at(now));
    questions.sort_by(|a, b| b.publication_date.cmp(&a.publication_date));
    Ok(questions)
}

/// Choices of a question with their vote counts, in creation order.
pub(crate) async fn retrieve_choices(
    pool: &sqlx::SqlitePool,
    question_id: i64,
) -> sqlx::Result<Vec<models::Choice>> {
    sqlx::query_as::<_, models::Choice>(
        r#"select choice.id, choice.question_id, choice.choice_text,
        (select count(vote.id) from vote where vote.choice_id = choice.id) as votes
        from choice where choice.question_id = $1 order by choice.id"#,
    )
    .bind(question_id)
    .fetch_all(pool)
    .await
}

/// A choice only counts as selected if it belongs to the question voted on.
async fn retrieve_choice_id(
    pool: &sqlx::SqlitePool,
    question_id: i64,
    choice_id: i64,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar(r#"select id from choice where id = $1 and question_id = $2"#)
        .bind(choice_id)
        .bind(question_id)
        .fetch_optional(pool)
        .await
}

async fn record_vote(
    pool: &sqlx::SqlitePool,
    user_id: i64,
    choice_id: i64,
) -> sqlx::Result<models::Vote> {
    sqlx::query_as::<_, models::Vote>(
        r#"insert into vote (user_id, choice_id) values ($1, $2) returning id, user_id, choice_id"#,
    )
    .bind(user_id)
    .bind(choice_id)
    .fetch_one(pool)
    .await
}

async fn no_such_question(app_data: &AppData, request: &HttpRequest, id: i64) -> HttpResponse {
    redirect_with_message(
        app_data,
        request,
        "/polls/",
        FlashMessage::error(format!("Poll {} does not exist", id)),
    )
    .await
}

async fn voting_closed(
    app_data: &AppData,
    request: &HttpRequest,
    question: &models::Question,
) -> HttpResponse {
    redirect_with_message(
        app_data,
        request,
        "/polls/",
        FlashMessage::error(format!(
            "Voting is not allowed for question \"{}\"",
            question.question_text
        )),
    )
    .await
}

async fn render_detail(
    app_data: &AppData,
    request: &HttpRequest,
    question: &models::Question,
    error_message: Option<&str>,
) -> HttpResponse {
    let choices = unwrap_or_log_and_internal_server_error_response!(
        retrieve_choices(&app_data.pool, question.id).await,
        INTERNAL_SERVER_ERROR
    );
    let mut context = tera::Context::new();
    context.insert("question", question);
    context.insert("choices", &choices);
    if let Some(error_message) = error_message {
        context.insert("error_message", error_message);
    }
    let body = unwrap_or_log_and_internal_server_error_response!(
        render_page(app_data, request, "polls/detail.html", context).await,
        INTERNAL_SERVER_ERROR
    );
    html(body)
}

#[derive(Debug, serde::Serialize)]
struct QuestionSummary {
    #[serde(flatten)]
    question: models::Question,
    published_recently: bool,
}

async fn get_questions(app_data: web::Data<AppData>, request: HttpRequest) -> impl Responder {
    let questions = unwrap_or_log_and_internal_server_error_response!(
        retrieve_published_questions(&app_data.pool, Utc::now()).await,
        INTERNAL_SERVER_ERROR
    );
    let questions: Vec<QuestionSummary> = questions
        .into_iter()
        .map(|question| QuestionSummary {
            published_recently: question.was_published_recently(),
            question,
        })
        .collect();
    let mut context = tera::Context::new();
    context.insert("latest_question_list", &questions);
    let body = unwrap_or_log_and_internal_server_error_response!(
        render_page(&app_data, &request, "polls/index.html", context).await,
        INTERNAL_SERVER_ERROR
    );
    html(body)
}

async fn get_question(
    app_data: web::Data<AppData>,
    request: HttpRequest,
    path_id: web::Path<i64>,
) -> impl Responder {
    let id = path_id.into_inner();
    let question = unwrap_or_log_and_internal_server_error_response!(
        retrieve_question(&app_data.pool, id).await,
        INTERNAL_SERVER_ERROR
    );
    let Some(question) = question else {
        return no_such_question(&app_data, &request, id).await;
    };
    if !question.can_vote() {
        return voting_closed(&app_data, &request, &question).await;
    }
    render_detail(&app_data, &request, &question, None).await
}

#[derive(Debug, serde::Deserialize)]
struct VoteForm {
    choice: Option<String>,
}

async fn post_vote(
    app_data: web::Data<AppData>,
    request: HttpRequest,
    path_id: web::Path<i64>,
    // a body that is not a form counts as no selection
    form: Option<web::Form<VoteForm>>,
) -> impl Responder {
    let id = path_id.into_inner();
    let pool = &app_data.pool;

    let user_id = unwrap_or_log_and_internal_server_error_response!(
        session::current_user_id(pool, &request).await,
        INTERNAL_SERVER_ERROR
    );
    let Some(user_id) = user_id else {
        return redirect(&format!("/accounts/login/?next=/polls/{}/", id));
    };

    let question = unwrap_or_log_and_internal_server_error_response!(
        retrieve_question(pool, id).await,
        INTERNAL_SERVER_ERROR
    );
    let Some(question) = question else {
        return no_such_question(&app_data, &request, id).await;
    };
    if !question.can_vote() {
        return voting_closed(&app_data, &request, &question).await;
    }

    let requested_choice = form
        .and_then(|form| form.into_inner().choice)
        .and_then(|choice| choice.trim().parse::<i64>().ok());
    let selected_choice = match requested_choice {
        Some(choice_id) => unwrap_or_log_and_internal_server_error_response!(
            retrieve_choice_id(pool, id, choice_id).await,
            INTERNAL_SERVER_ERROR
        ),
        None => None,
    };
    let Some(choice_id) = selected_choice else {
        return render_detail(&app_data, &request, &question, Some(NO_CHOICE_SELECTED)).await;
    };

    let vote = unwrap_or_log_and_internal_server_error_response!(
        record_vote(pool, user_id, choice_id).await,
        INTERNAL_SERVER_ERROR
    );
    log::debug!("user {} voted for choice {}", vote.user_id, vote.choice_id);
    redirect(&format!("/polls/{}/results/", id))
}

async fn get_results(
    app_data: web::Data<AppData>,
    request: HttpRequest,
    path_id: web::Path<i64>,
) -> impl Responder {
    let id = path_id.into_inner();
    let question = unwrap_or_log_and_internal_server_error_response!(
        retrieve_question(&app_data.pool, id).await,
        INTERNAL_SERVER_ERROR
    );
    // results of questions that are not public yet are hidden like unknown ones
    let Some(question) = question.filter(|question| question.is_published()) else {
        return no_such_question(&app_data, &request, id).await;
    };
    let choices = unwrap_or_log_and_internal_server_error_response!(
        retrieve_choices(&app_data.pool, id).await,
        INTERNAL_SERVER_ERROR
    );
    let mut context = tera::Context::new();
    context.insert("question", &question);
    context.insert("choices", &choices);
    context.insert("can_vote", &question.can_vote());
    let body = unwrap_or_log_and_internal_server_error_response!(
        render_page(&app_data, &request, "polls/results.html", context).await,
        INTERNAL_SERVER_ERROR
    );
    html(body)
}

const COLORS: &[&RGBColor] = &[&RED, &GREEN, &BLUE, &YELLOW, &CYAN, &MAGENTA];

const fn get_color(index: usize) -> &'static RGBColor {
    COLORS[index % COLORS.len()]
}

use anyhow::{ensure, Result};
use plotters::prelude::*;

/// Horizontal bar chart of the vote counts as an svg document.
fn draw_bar_graph(caption: &str, data: &[models::Choice]) -> Result<String> {
    ensure!(!data.is_empty(), "no choices to draw");

    let mut buffer = String::new();

    let data_len = data.len();

    let svg_backend = SVGBackend::with_string(&mut buffer, (600, 400));
    let root_area = svg_backend.into_drawing_area();
    root_area.fill(&WHITE)?;

    // an empty axis can't be drawn, so show at least one vote
    let max_count = data.iter().map(|x| x.votes).max().unwrap_or(0).max(1);

    let mut context = ChartBuilder::on(&root_area)
        .set_label_area_size(LabelAreaPosition::Left, 40)
        // to make sure the most right number on the x axis is not cut off
        .set_label_area_size(LabelAreaPosition::Right, 5)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .caption(caption, ("sans-serif", 40))
        // -1 because the upper bound is included, even though the range is exclusive
        .build_cartesian_2d(0..max_count, (0..data_len - 1).into_segmented())?;

    context
        .configure_mesh()
        .y_label_formatter(&|x| match x {
            SegmentValue::CenterOf(x) => data[data_len - *x - 1].choice_text.clone(),
            _ => "".to_string(),
        })
        .draw()?;

    let data_values = data.iter().map(|x| x.votes);

    context.draw_series((0..).zip(data_values).map(|(y, x)| {
        let reversed_y = data_len - y - 1;
        let mut bar = Rectangle::new(
            [
                (0, SegmentValue::Exact(reversed_y)),
                (x, SegmentValue::Exact(reversed_y + 1)),
            ],
            get_color(y).filled(),
        );
        bar.set_margin(5, 5, 0, 0);
        bar
    }))?;

    // both borrow the buffer
    drop(context);
    drop(root_area);

    Ok(buffer)
}

async fn get_results_graph(app_data: web::Data<AppData>, path_id: web::Path<i64>) -> impl Responder {
    let id = path_id.into_inner();
    let pool = &app_data.pool;

    let question = unwrap_or_log_and_internal_server_error_response!(
        retrieve_question(pool, id).await,
        INTERNAL_SERVER_ERROR
    );
    let Some(question) = question.filter(|question| question.is_published()) else {
        return HttpResponse::NotFound()
            .content_type(ContentType::plaintext())
            .body("no such question");
    };
    let choices = unwrap_or_log_and_internal_server_error_response!(
        retrieve_choices(pool, id).await,
        INTERNAL_SERVER_ERROR
    );
    if choices.is_empty() {
        return HttpResponse::NotFound()
            .content_type(ContentType::plaintext())
            .body("question has no choices");
    }

    let svg_content = unwrap_or_log_and_internal_server_error_response!(
        draw_bar_graph(&question.question_text, &choices),
        INTERNAL_SERVER_ERROR
    );
    HttpResponse::Ok()
        .content_type("image/svg+xml")
        .body(svg_content)
}

pub fn configure_routes(config: &mut ServiceConfig) {
    config.route("/", web::get().to(get_questions));
    config.route("/{id}/", web::get().to(get_question));
    config.route("/{id}/vote/", web::post().to(post_vote));
    config.route("/{id}/results/", web::get().to(get_results));
    config.route("/{id}/results/graph/", web::get().to(get_results_graph));
}
