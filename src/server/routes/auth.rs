use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{hash_password, verify_password, TokenIssuer, MIN_PASSWORD_LEN},
    db::{queries::users, Role, User},
    server::{
        app::AppState,
        error::ApiError,
        extract::ApiJson,
        policy::{AccessPolicy, CurrentUser},
    },
};

use super::{required, ApiResponse};

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct AuthResponse {
    token: String,
    user: User,
}

fn respond_with_token(tokens: &TokenIssuer, user: User) -> ApiResponse<AuthResponse> {
    let token = tokens.issue(&user)?;
    Ok(AuthResponse { token, user })
}

/// Shared checks for any new account: email shape, password length, uniqueness.
pub(super) async fn check_new_account(
    pool: &sqlx::SqlitePool,
    username: &str,
    email: &str,
    password: &str,
) -> ApiResponse<()> {
    if !is_plausible_email(email) {
        return Err(ApiError::validation("Email address is malformed"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if users::email_taken(pool, email, None).await? {
        return Err(ApiError::validation("User with this email already exists"));
    }
    if users::username_taken(pool, username, None).await? {
        return Err(ApiError::validation("User with this username already exists"));
    }
    Ok(())
}

pub(super) fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(' ')
        }
        None => false,
    }
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResponse<(StatusCode, Json<AuthResponse>)> {
    if !state.allow_registration {
        return Err(ApiError::Forbidden("Registration is disabled".to_owned()));
    }
    const REQUIRED: &str = "Username, email and password are required";
    let username = required(req.username, REQUIRED)?;
    let email = required(req.email, REQUIRED)?;
    let password = required(req.password, REQUIRED)?;
    check_new_account(&state.pool, &username, &email, &password).await?;

    let hash = hash_password(&password)?;
    let id = users::create_user(&state.pool, &username, &email, &hash, Role::Admin).await?;
    tracing::info!(user_id = id, "Account registered");

    let user = users::get_user(&state.pool, id).await?;
    Ok((
        StatusCode::CREATED,
        Json(respond_with_token(&state.tokens, user)?),
    ))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResponse<Json<AuthResponse>> {
    const REQUIRED: &str = "Email and password are required";
    let email = required(req.email, REQUIRED)?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::validation(REQUIRED))?;

    let credentials = users::find_credentials_by_email(&state.pool, &email).await?;
    let user = match credentials {
        Some(c) if verify_password(&password, &c.password_hash) => c.user,
        _ => {
            tracing::info!("Failed login attempt");
            return Err(ApiError::validation("Invalid email or password"));
        }
    };
    tracing::info!(user_id = user.id, "Login succeeded");

    Ok(Json(respond_with_token(&state.tokens, user)?))
}

async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

pub fn auth_router(state: AppState) -> Router {
    let authenticated = Router::new().route("/api/auth/me", get(me));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .merge(AccessPolicy::ADMINS.guard(authenticated, &state))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_needs_both_halves() {
        assert!(is_plausible_email("doc@clinic.org"));
        assert!(!is_plausible_email("doc"));
        assert!(!is_plausible_email("@clinic.org"));
        assert!(!is_plausible_email("doc@"));
        assert!(!is_plausible_email("doc@a@b"));
        assert!(!is_plausible_email("d oc@clinic.org"));
    }
}
