use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    cache::QueryCache,
    db::{
        queries::{categories, questions},
        Question,
    },
    listing::{self, ListParams, ListQuery},
    server::{
        app::AppState,
        deserializers::deserialize_optional_i64,
        error::ApiError,
        extract::{ApiJson, ApiPath, ApiQuery},
        policy::AccessPolicy,
    },
};

use super::{required, ApiResponse, Message};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionInput {
    question: Option<String>,
    answer: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    category_id: Option<i64>,
}

struct ValidQuestion {
    question: String,
    answer: String,
    category_id: Option<i64>,
}

async fn validate(
    pool: &SqlitePool,
    input: QuestionInput,
    current: Option<i64>,
) -> ApiResponse<ValidQuestion> {
    const REQUIRED: &str = "Question and answer are required";
    let question = required(input.question, REQUIRED)?;
    let answer = required(input.answer, REQUIRED)?;

    if questions::question_taken(pool, &question, current).await? {
        return Err(ApiError::validation(
            "A question with this text already exists",
        ));
    }
    if let Some(category_id) = input.category_id {
        if !categories::category_exists(pool, category_id).await? {
            return Err(ApiError::validation("Category not found"));
        }
    }
    Ok(ValidQuestion {
        question,
        answer,
        category_id: input.category_id,
    })
}

async fn list_questions(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResponse<Response> {
    let query = ListQuery::try_from(params)?;
    let payload = listing::cached_page(&pool, &cache, &query).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        payload.to_string(),
    )
        .into_response())
}

async fn get_question(
    State(pool): State<SqlitePool>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Json<Question>> {
    Ok(Json(questions::get_question_by_id(&pool, id).await?))
}

async fn create_question(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiJson(input): ApiJson<QuestionInput>,
) -> ApiResponse<(StatusCode, Json<Question>)> {
    let valid = validate(&pool, input, None).await?;
    let id = questions::create_question(
        &pool,
        &valid.question,
        &valid.answer,
        valid.category_id,
    )
    .await?;
    cache.flush().await;
    tracing::info!(question_id = id, "Question created");

    let question = questions::get_question_by_id(&pool, id).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn update_question(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<QuestionInput>,
) -> ApiResponse<Json<Question>> {
    let valid = validate(&pool, input, Some(id)).await?;
    let updated = questions::update_question(
        &pool,
        id,
        &valid.question,
        &valid.answer,
        valid.category_id,
    )
    .await?;
    if updated == 0 {
        return Err(ApiError::not_found("Question not found"));
    }
    cache.flush().await;
    tracing::info!(question_id = id, "Question updated");

    Ok(Json(questions::get_question_by_id(&pool, id).await?))
}

async fn delete_question(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Json<Message>> {
    if questions::delete_question(&pool, id).await? == 0 {
        return Err(ApiError::not_found("Question not found"));
    }
    cache.flush().await;
    tracing::info!(question_id = id, "Question deleted");
    Ok(Json(Message::new("Question deleted")))
}

pub fn questions_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/questions", post(create_question))
        .route(
            "/api/questions/{id}",
            put(update_question).delete(delete_question),
        );

    Router::new()
        .route("/api/questions", get(list_questions))
        .route("/api/questions/{id}", get(get_question))
        .merge(AccessPolicy::ADMINS.guard(admin, &state))
        .with_state(state)
}
