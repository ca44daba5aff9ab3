use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, MIN_PASSWORD_LEN},
    db::{
        queries::{
            action_logs::{self, ActionType},
            users,
        },
        ActionLog, Role, User,
    },
    server::{
        app::AppState,
        error::ApiError,
        extract::{ApiJson, ApiPath},
        policy::{AccessPolicy, CurrentUser},
    },
    telemetry::ACCOUNT_ACTION_CNTR,
};

use super::{
    auth::{check_new_account, is_plausible_email},
    required, ApiResponse, Message,
};

const ACTION_LOG_LIMIT: i64 = 100;

#[derive(Deserialize)]
struct NewUser {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct UserUpdate {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct RoleChange {
    role: Option<Role>,
}

async fn get_users(State(pool): State<SqlitePool>) -> ApiResponse<Json<Vec<User>>> {
    Ok(Json(users::get_users(&pool).await?))
}

async fn get_logs(State(pool): State<SqlitePool>) -> ApiResponse<Json<Vec<ActionLog>>> {
    Ok(Json(
        action_logs::get_action_logs(&pool, ACTION_LOG_LIMIT).await?,
    ))
}

async fn create_admin(
    State(pool): State<SqlitePool>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiJson(new_user): ApiJson<NewUser>,
) -> ApiResponse<(StatusCode, Json<User>)> {
    const REQUIRED: &str = "Username, email and password are required";
    let username = required(new_user.username, REQUIRED)?;
    let email = required(new_user.email, REQUIRED)?;
    let password = required(new_user.password, REQUIRED)?;
    check_new_account(&pool, &username, &email, &password).await?;

    let hash = hash_password(&password)?;
    let id = users::create_user(&pool, &username, &email, &hash, Role::Admin).await?;
    ACCOUNT_ACTION_CNTR.with_label_values(&["create"]).inc();
    tracing::info!(user_id = id, actor = actor.id, "Administrator created");

    Ok((StatusCode::CREATED, Json(users::get_user(&pool, id).await?)))
}

async fn update_user(
    State(pool): State<SqlitePool>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<UserUpdate>,
) -> ApiResponse<Json<User>> {
    if users::find_user(&pool, id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    const REQUIRED: &str = "Username and email are required";
    let username = required(update.username, REQUIRED)?;
    let email = required(update.email, REQUIRED)?;
    if !is_plausible_email(&email) {
        return Err(ApiError::validation("Email address is malformed"));
    }
    if users::email_taken(&pool, &email, Some(id)).await? {
        return Err(ApiError::validation("User with this email already exists"));
    }
    if users::username_taken(&pool, &username, Some(id)).await? {
        return Err(ApiError::validation("User with this username already exists"));
    }

    let hash = match update.password.filter(|p| !p.is_empty()) {
        Some(password) if password.chars().count() < MIN_PASSWORD_LEN => {
            return Err(ApiError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        Some(password) => Some(hash_password(&password)?),
        None => None,
    };

    users::update_user(&pool, id, &username, &email, hash.as_deref()).await?;
    ACCOUNT_ACTION_CNTR.with_label_values(&["update"]).inc();
    tracing::info!(user_id = id, "User updated");

    Ok(Json(users::get_user(&pool, id).await?))
}

async fn change_role(
    State(pool): State<SqlitePool>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(change): ApiJson<RoleChange>,
) -> ApiResponse<Json<User>> {
    let role = change
        .role
        .ok_or_else(|| ApiError::validation("Role is required"))?;
    if actor.id == id {
        return Err(ApiError::validation("You cannot change your own role"));
    }
    let target = users::find_user(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut tx = pool.begin().await?;
    action_logs::record_action(
        &mut *tx,
        actor.id,
        ActionType::UpdateUserRole,
        &format!(
            "Role of {} changed from {} to {}",
            target.username, target.role, role
        ),
        id,
        "User",
    )
    .await?;
    users::update_role(&mut *tx, id, role).await?;
    tx.commit().await?;

    ACCOUNT_ACTION_CNTR.with_label_values(&["change_role"]).inc();
    tracing::info!(user_id = id, actor = actor.id, %role, "Role changed");

    Ok(Json(users::get_user(&pool, id).await?))
}

async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Json<Message>> {
    if actor.id == id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }
    let target = users::find_user(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if target.role == Role::SuperAdmin {
        return Err(ApiError::validation(
            "Superadministrator accounts cannot be deleted",
        ));
    }

    let mut tx = pool.begin().await?;
    action_logs::record_action(
        &mut *tx,
        actor.id,
        ActionType::DeleteUser,
        &format!("Deleted user {} ({})", target.username, target.email),
        id,
        "User",
    )
    .await?;
    users::delete_user(&mut *tx, id).await?;
    tx.commit().await?;

    ACCOUNT_ACTION_CNTR.with_label_values(&["delete"]).inc();
    tracing::info!(user_id = id, actor = actor.id, "User deleted");

    Ok(Json(Message::new("User deleted")))
}

pub fn users_router(state: AppState) -> Router {
    let superadmin = Router::new()
        .route("/api/users", get(get_users).post(create_admin))
        .route("/api/users/admin", post(create_admin))
        .route("/api/users/logs", get(get_logs))
        .route("/api/users/{id}", put(update_user).delete(delete_user))
        .route("/api/users/{id}/role", put(change_role));

    AccessPolicy::SUPERADMINS
        .guard(superadmin, &state)
        .with_state(state)
}
