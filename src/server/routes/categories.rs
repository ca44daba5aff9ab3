use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    cache::QueryCache,
    db::{
        queries::categories::{self, get_all_categories, get_category},
        Category,
    },
    server::{
        app::AppState,
        error::ApiError,
        extract::{ApiJson, ApiPath},
        policy::AccessPolicy,
    },
};

use super::{optional, required, ApiResponse};

const DUPLICATE_NAME: &str = "A category with this name already exists";

#[derive(Deserialize)]
struct NewCategory {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct CategoryUpdate {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryDeleted {
    message: String,
    removed_questions: i64,
}

async fn get_categories(State(pool): State<SqlitePool>) -> ApiResponse<Json<Vec<Category>>> {
    Ok(Json(get_all_categories(&pool).await?))
}

async fn category(
    State(pool): State<SqlitePool>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Json<Category>> {
    Ok(Json(get_category(&pool, id).await?))
}

async fn create_category(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiJson(new_category): ApiJson<NewCategory>,
) -> ApiResponse<(StatusCode, Json<Category>)> {
    let name = required(new_category.name, "Category name is required")?;
    if categories::name_taken(&pool, &name, None).await? {
        return Err(ApiError::validation(DUPLICATE_NAME));
    }
    let description = optional(new_category.description);

    let id = categories::create_category(&pool, &name, description.as_deref()).await?;
    cache.flush().await;
    tracing::info!(category_id = id, "Category created");

    Ok((StatusCode::CREATED, Json(get_category(&pool, id).await?)))
}

async fn update_category(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(category): ApiJson<CategoryUpdate>,
) -> ApiResponse<Json<Category>> {
    let name = match category.name {
        Some(name) => Some(required(Some(name), "Category name cannot be empty")?),
        None => None,
    };
    if let Some(name) = &name {
        if categories::name_taken(&pool, name, Some(id)).await? {
            return Err(ApiError::validation(DUPLICATE_NAME));
        }
    }
    // Absent keeps the description; a blank string clears it.
    let description = category.description.map(|d| optional(Some(d)));

    let updated = categories::update_category(
        &pool,
        id,
        name.as_deref(),
        description.as_ref().map(Option::as_deref),
    )
    .await?;
    if updated == 0 {
        return Err(ApiError::not_found("Category not found"));
    }
    cache.flush().await;
    tracing::info!(category_id = id, "Category updated");

    Ok(Json(get_category(&pool, id).await?))
}

async fn delete_category(
    State(pool): State<SqlitePool>,
    State(cache): State<Arc<QueryCache>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Json<CategoryDeleted>> {
    let removed_questions = match categories::delete_category(&pool, id).await {
        Ok(removed) => removed,
        Err(sqlx::Error::RowNotFound) => return Err(ApiError::not_found("Category not found")),
        Err(e) => return Err(e.into()),
    };
    cache.flush().await;
    tracing::info!(category_id = id, removed_questions, "Category deleted");

    Ok(Json(CategoryDeleted {
        message: "Category deleted".to_owned(),
        removed_questions,
    }))
}

pub fn category_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/categories", post(create_category))
        .route(
            "/api/categories/{id}",
            put(update_category).delete(delete_category),
        );

    Router::new()
        .route("/api/categories", get(get_categories))
        .route("/api/categories/{id}", get(category))
        .merge(AccessPolicy::ADMINS.guard(admin, &state))
        .with_state(state)
}
